// Copyright 2023 Remi Bernotavicius

use crate::database::{
    self,
    models::{
        Ingredient, IngredientAmount, IngredientId, NewIngredientAmount, NewRecipe, NewTagRecipe,
        Recipe, RecipeChanges, RecipeId, Tag, TagId, TagRecipe, User, UserId,
    },
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::images;
use crate::pagination::PageRequest;
use crate::users::{followed_among, UserView};
use diesel::prelude::OptionalExtension as _;
use diesel::sqlite::Sqlite;
use diesel::BelongingToDsl as _;
use diesel::Connection as _;
use diesel::ExpressionMethods as _;
use diesel::GroupedBy as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const MAX_NAME_LEN: usize = 200;
/// Cooking times and amounts are stored as small positive integers.
const MAX_SMALL_INT: i32 = 32767;

#[derive(Deserialize, Debug, Clone)]
pub struct IngredientInput {
    pub id: IngredientId,
    pub amount: i32,
}

/// Body of both create and partial update. Tags and ingredients are always
/// required: an update replaces both lists wholesale.
#[derive(Deserialize, Default, Debug)]
pub struct RecipePayload {
    pub tags: Option<Vec<TagId>>,
    pub ingredients: Option<Vec<IngredientInput>>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
}

struct ValidRecipe {
    tags: Vec<TagId>,
    ingredients: Vec<IngredientInput>,
    name: Option<String>,
    image: Option<images::DecodedImage>,
    text: Option<String>,
    cooking_time: Option<i32>,
}

fn required(errors: &mut FieldErrors, field: &'static str) {
    errors
        .entry(field)
        .or_default()
        .push("this field is required".into());
}

fn validate(payload: RecipePayload, creating: bool) -> AppResult<ValidRecipe> {
    let mut errors = FieldErrors::new();

    let tags = payload.tags.unwrap_or_else(|| {
        required(&mut errors, "tags");
        vec![]
    });
    let mut seen = HashSet::new();
    if let Some(duplicate) = tags.iter().find(|t| !seen.insert(**t)) {
        errors
            .entry("tags")
            .or_default()
            .push(format!("tag {duplicate} is listed more than once"));
    }

    let ingredients = payload.ingredients.unwrap_or_default();
    if ingredients.is_empty() {
        errors
            .entry("ingredients")
            .or_default()
            .push("a recipe needs at least one ingredient".into());
    }
    let mut seen = HashSet::new();
    for i in &ingredients {
        if !seen.insert(i.id) {
            errors
                .entry("ingredients")
                .or_default()
                .push(format!("ingredient {} is listed more than once", i.id));
        }
        if !(1..=MAX_SMALL_INT).contains(&i.amount) {
            errors
                .entry("ingredients")
                .or_default()
                .push(format!("amount of ingredient {} must be between 1 and {MAX_SMALL_INT}", i.id));
        }
    }

    match payload.name.as_deref().map(str::trim) {
        None if creating => required(&mut errors, "name"),
        Some("") => errors
            .entry("name")
            .or_default()
            .push("may not be blank".into()),
        Some(n) if n.chars().count() > MAX_NAME_LEN => errors
            .entry("name")
            .or_default()
            .push(format!("must be at most {MAX_NAME_LEN} characters")),
        _ => {}
    }

    match payload.text.as_deref().map(str::trim) {
        None if creating => required(&mut errors, "text"),
        Some("") => errors
            .entry("text")
            .or_default()
            .push("may not be blank".into()),
        _ => {}
    }

    match payload.cooking_time {
        None if creating => required(&mut errors, "cooking_time"),
        Some(t) if !(1..=MAX_SMALL_INT).contains(&t) => errors
            .entry("cooking_time")
            .or_default()
            .push(format!("must be between 1 and {MAX_SMALL_INT} minutes")),
        _ => {}
    }

    let image = match payload.image.as_deref() {
        None if creating => {
            required(&mut errors, "image");
            None
        }
        None => None,
        Some(raw) => match images::decode_inline(raw) {
            Ok(image) => Some(image),
            Err(AppError::Validation(fields)) => {
                for (field, messages) in fields {
                    errors.entry(field).or_default().extend(messages);
                }
                None
            }
            Err(e) => return Err(e),
        },
    };

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    Ok(ValidRecipe {
        tags,
        ingredients,
        name: payload.name.map(|n| n.trim().to_owned()),
        image,
        text: payload.text,
        cooking_time: payload.cooking_time,
    })
}

/// Links the recipe to its tags and ingredient amounts, failing with `NotFound` on
/// the first id missing from the catalog. Must run inside the caller's transaction.
fn insert_associations(
    conn: &mut database::Connection,
    recipe: RecipeId,
    tags: &[TagId],
    ingredients: &[IngredientInput],
) -> AppResult<()> {
    use database::schema::{ingredient_amounts, ingredients as catalog, tag_recipes, tags as tag_catalog};

    let known_tags: HashSet<TagId> = tag_catalog::table
        .filter(tag_catalog::id.eq_any(tags.to_vec()))
        .select(tag_catalog::id)
        .load(conn)?
        .into_iter()
        .collect();
    if let Some(missing) = tags.iter().find(|t| !known_tags.contains(t)) {
        return Err(AppError::not_found(format_args!("tag {missing}")));
    }

    let wanted: Vec<IngredientId> = ingredients.iter().map(|i| i.id).collect();
    let known_ingredients: HashSet<IngredientId> = catalog::table
        .filter(catalog::id.eq_any(wanted))
        .select(catalog::id)
        .load(conn)?
        .into_iter()
        .collect();
    if let Some(missing) = ingredients
        .iter()
        .find(|i| !known_ingredients.contains(&i.id))
    {
        return Err(AppError::not_found(format_args!("ingredient {}", missing.id)));
    }

    let tag_rows: Vec<_> = tags
        .iter()
        .map(|&tag_id| NewTagRecipe {
            tag_id,
            recipe_id: recipe,
        })
        .collect();
    if !tag_rows.is_empty() {
        diesel::insert_into(tag_recipes::table)
            .values(&tag_rows)
            .execute(conn)?;
    }

    let amount_rows: Vec<_> = ingredients
        .iter()
        .map(|i| NewIngredientAmount {
            recipe_id: recipe,
            ingredient_id: i.id,
            amount: i.amount,
        })
        .collect();
    if !amount_rows.is_empty() {
        diesel::insert_into(ingredient_amounts::table)
            .values(&amount_rows)
            .execute(conn)?;
    }
    Ok(())
}

pub fn create_recipe(
    conn: &mut database::Connection,
    media_root: &Path,
    author: &User,
    payload: RecipePayload,
) -> AppResult<RecipeView> {
    let recipe = validate(payload, true)?;
    let image = recipe
        .image
        .as_ref()
        .ok_or_else(|| AppError::invalid("image", "this field is required"))?;
    let image_path = images::store(media_root, image)?;

    let created = conn.transaction(|conn| {
        let created = diesel::insert_into(database::schema::recipes::table)
            .values(NewRecipe {
                author_id: author.id,
                name: recipe.name.as_deref().unwrap_or_default(),
                image: &image_path,
                text: recipe.text.as_deref().unwrap_or_default(),
                cooking_time: recipe.cooking_time.unwrap_or_default(),
                created_at: chrono::Utc::now().naive_utc(),
            })
            .returning(Recipe::as_returning())
            .get_result(conn)?;
        insert_associations(conn, created.id, &recipe.tags, &recipe.ingredients)?;
        AppResult::Ok(created)
    });

    match created {
        Ok(created) => {
            log::info!("user {} created recipe {}", author.id, created.id);
            Ok(recipe_views(conn, Some(author.id), vec![created])?.remove(0))
        }
        Err(e) => {
            images::remove(media_root, &image_path);
            Err(e)
        }
    }
}

fn get_recipe_row(conn: &mut database::Connection, recipe_id: RecipeId) -> AppResult<Recipe> {
    use database::schema::recipes::dsl::*;

    recipes
        .find(recipe_id)
        .select(Recipe::as_select())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found(format_args!("recipe {recipe_id}")))
}

fn check_can_edit(user: &User, recipe: &Recipe) -> AppResult<()> {
    if recipe.author_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Updates the given scalar fields and replaces the full tag and ingredient lists.
pub fn update_recipe(
    conn: &mut database::Connection,
    media_root: &Path,
    user: &User,
    recipe_id: RecipeId,
    payload: RecipePayload,
) -> AppResult<RecipeView> {
    use database::schema::{ingredient_amounts, recipes, tag_recipes};

    let existing = get_recipe_row(conn, recipe_id)?;
    check_can_edit(user, &existing)?;
    let recipe = validate(payload, false)?;
    let new_image = recipe
        .image
        .as_ref()
        .map(|image| images::store(media_root, image))
        .transpose()?;

    let updated = conn.transaction(|conn| {
        let changes = RecipeChanges {
            name: recipe.name.as_deref(),
            image: new_image.as_deref(),
            text: recipe.text.as_deref(),
            cooking_time: recipe.cooking_time,
        };
        if changes.name.is_some()
            || changes.image.is_some()
            || changes.text.is_some()
            || changes.cooking_time.is_some()
        {
            diesel::update(recipes::table.find(recipe_id))
                .set(&changes)
                .execute(conn)?;
        }

        diesel::delete(tag_recipes::table.filter(tag_recipes::recipe_id.eq(recipe_id)))
            .execute(conn)?;
        diesel::delete(
            ingredient_amounts::table.filter(ingredient_amounts::recipe_id.eq(recipe_id)),
        )
        .execute(conn)?;
        insert_associations(conn, recipe_id, &recipe.tags, &recipe.ingredients)?;

        get_recipe_row(conn, recipe_id)
    });

    match updated {
        Ok(updated) => {
            if new_image.is_some() {
                images::remove(media_root, &existing.image);
            }
            log::info!("user {} updated recipe {recipe_id}", user.id);
            Ok(recipe_views(conn, Some(user.id), vec![updated])?.remove(0))
        }
        Err(e) => {
            if let Some(path) = &new_image {
                images::remove(media_root, path);
            }
            Err(e)
        }
    }
}

pub fn delete_recipe(
    conn: &mut database::Connection,
    media_root: &Path,
    user: &User,
    recipe_id: RecipeId,
) -> AppResult<()> {
    use database::schema::recipes::dsl::*;

    let existing = get_recipe_row(conn, recipe_id)?;
    check_can_edit(user, &existing)?;
    diesel::delete(recipes.find(recipe_id)).execute(conn)?;
    images::remove(media_root, &existing.image);
    log::info!("user {} deleted recipe {recipe_id}", user.id);
    Ok(())
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeIngredientView {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Serialize, Debug, Clone)]
pub struct RecipeView {
    pub id: RecipeId,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<RecipeIngredientView>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

/// The short form used by favorites, the cart and subscriptions.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeSummary {
    pub id: RecipeId,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl From<&Recipe> for RecipeSummary {
    fn from(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            image: images::url(&recipe.image),
            cooking_time: recipe.cooking_time,
        }
    }
}

pub fn recipe_summary(conn: &mut database::Connection, recipe_id: RecipeId) -> AppResult<RecipeSummary> {
    Ok(RecipeSummary::from(&get_recipe_row(conn, recipe_id)?))
}

/// The subset of `recipe_ids` that `viewer` has in the given relation table.
fn marked_by(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    recipe_ids: &[RecipeId],
    favorites: bool,
) -> AppResult<HashSet<RecipeId>> {
    use database::schema::{favorites as fav, shopping_cart as cart};

    let Some(viewer) = viewer else {
        return Ok(HashSet::new());
    };
    let marked: Vec<RecipeId> = if favorites {
        fav::table
            .filter(fav::user_id.eq(viewer))
            .filter(fav::recipe_id.eq_any(recipe_ids.to_vec()))
            .select(fav::recipe_id)
            .load(conn)?
    } else {
        cart::table
            .filter(cart::owner_id.eq(viewer))
            .filter(cart::recipe_id.eq_any(recipe_ids.to_vec()))
            .select(cart::recipe_id)
            .load(conn)?
    };
    Ok(marked.into_iter().collect())
}

/// Expands recipe rows into full views, keeping their order. `is_favorited`,
/// `is_in_shopping_cart` and `is_subscribed` are evaluated against `viewer`.
pub fn recipe_views(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    rows: Vec<Recipe>,
) -> AppResult<Vec<RecipeView>> {
    use database::schema::{ingredient_amounts, ingredients, tag_recipes, tags, users};

    let tags_per_recipe: Vec<Vec<(TagRecipe, Tag)>> = TagRecipe::belonging_to(&rows)
        .inner_join(tags::table)
        .select((TagRecipe::as_select(), Tag::as_select()))
        .order(tag_recipes::id)
        .load(conn)?
        .grouped_by(&rows);

    let ingredients_per_recipe: Vec<Vec<(IngredientAmount, Ingredient)>> =
        IngredientAmount::belonging_to(&rows)
            .inner_join(ingredients::table)
            .select((IngredientAmount::as_select(), Ingredient::as_select()))
            .order(ingredient_amounts::id)
            .load(conn)?
            .grouped_by(&rows);

    let author_ids: Vec<UserId> = rows.iter().map(|r| r.author_id).collect();
    let authors: HashMap<UserId, User> = users::table
        .filter(users::id.eq_any(author_ids.clone()))
        .select(User::as_select())
        .load(conn)?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();
    let followed = followed_among(conn, viewer, author_ids)?;

    let recipe_ids: Vec<RecipeId> = rows.iter().map(|r| r.id).collect();
    let favorited = marked_by(conn, viewer, &recipe_ids, true)?;
    let in_cart = marked_by(conn, viewer, &recipe_ids, false)?;

    let mut views = Vec::with_capacity(rows.len());
    for ((recipe, tag_rows), ingredient_rows) in rows
        .into_iter()
        .zip(tags_per_recipe)
        .zip(ingredients_per_recipe)
    {
        let author = authors
            .get(&recipe.author_id)
            .ok_or_else(|| AppError::not_found(format_args!("author of recipe {}", recipe.id)))?;
        views.push(RecipeView {
            id: recipe.id,
            tags: tag_rows.into_iter().map(|(_, tag)| tag).collect(),
            author: UserView::new(author, followed.contains(&author.id)),
            ingredients: ingredient_rows
                .into_iter()
                .map(|(usage, i)| RecipeIngredientView {
                    id: i.id,
                    name: i.name,
                    measurement_unit: i.measurement_unit,
                    amount: usage.amount,
                })
                .collect(),
            is_favorited: favorited.contains(&recipe.id),
            is_in_shopping_cart: in_cart.contains(&recipe.id),
            name: recipe.name,
            image: images::url(&recipe.image),
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        });
    }
    Ok(views)
}

pub fn get_recipe(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    recipe_id: RecipeId,
) -> AppResult<RecipeView> {
    let recipe = get_recipe_row(conn, recipe_id)?;
    Ok(recipe_views(conn, viewer, vec![recipe])?.remove(0))
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub author: Option<UserId>,
}

fn filtered_recipes(
    viewer: Option<UserId>,
    filter: &RecipeFilter,
    tag_ids: &[TagId],
) -> database::schema::recipes::BoxedQuery<'static, Sqlite> {
    use database::schema::{favorites, recipes, shopping_cart, tag_recipes};

    let mut query = recipes::table.into_boxed();
    if !filter.tags.is_empty() {
        query = query.filter(
            recipes::id.eq_any(
                tag_recipes::table
                    .filter(tag_recipes::tag_id.eq_any(tag_ids.to_vec()))
                    .select(tag_recipes::recipe_id),
            ),
        );
    }
    if let Some(author) = filter.author {
        query = query.filter(recipes::author_id.eq(author));
    }
    if let Some(viewer) = viewer {
        if filter.is_favorited {
            query = query.filter(
                recipes::id.eq_any(
                    favorites::table
                        .filter(favorites::user_id.eq(viewer))
                        .select(favorites::recipe_id),
                ),
            );
        }
        if filter.is_in_shopping_cart {
            query = query.filter(
                recipes::id.eq_any(
                    shopping_cart::table
                        .filter(shopping_cart::owner_id.eq(viewer))
                        .select(shopping_cart::recipe_id),
                ),
            );
        }
    }
    query
}

/// Newest first. Anonymous callers asking for their favorites or cart get nothing.
pub fn list_recipes(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    filter: &RecipeFilter,
    page: PageRequest,
) -> AppResult<(i64, Vec<RecipeView>)> {
    use database::schema::{recipes, tags};

    if viewer.is_none() && (filter.is_favorited || filter.is_in_shopping_cart) {
        return Ok((0, vec![]));
    }
    let tag_ids: Vec<TagId> = tags::table
        .filter(tags::slug.eq_any(filter.tags.clone()))
        .select(tags::id)
        .load(conn)?;

    let count: i64 = filtered_recipes(viewer, filter, &tag_ids)
        .count()
        .get_result(conn)?;
    let rows = filtered_recipes(viewer, filter, &tag_ids)
        .select(Recipe::as_select())
        .order((recipes::created_at.desc(), recipes::id.desc()))
        .limit(page.limit)
        .offset(page.offset())
        .load(conn)?;
    Ok((count, recipe_views(conn, viewer, rows)?))
}

/// An author's recipes, newest first, optionally capped at `limit`.
pub fn recipes_by_author(
    conn: &mut database::Connection,
    author: UserId,
    limit: Option<i64>,
) -> AppResult<(i64, Vec<RecipeSummary>)> {
    use database::schema::recipes::dsl::*;

    let count: i64 = recipes.filter(author_id.eq(author)).count().get_result(conn)?;
    let mut query = recipes
        .filter(author_id.eq(author))
        .select(Recipe::as_select())
        .order((created_at.desc(), id.desc()))
        .into_boxed();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    let rows = query.load(conn)?;
    Ok((count, rows.iter().map(RecipeSummary::from).collect()))
}

#[cfg(test)]
pub fn recipe_for_test(
    conn: &mut database::Connection,
    author: &User,
    name: &str,
    tags: &[TagId],
    ingredients: &[(IngredientId, i32)],
) -> Recipe {
    conn.transaction(|conn| {
        let created = diesel::insert_into(database::schema::recipes::table)
            .values(NewRecipe {
                author_id: author.id,
                name,
                image: "recipes/images/test.png",
                text: "mix and serve",
                cooking_time: 10,
                created_at: chrono::Utc::now().naive_utc(),
            })
            .returning(Recipe::as_returning())
            .get_result(conn)?;
        let ingredients: Vec<_> = ingredients
            .iter()
            .map(|&(id, amount)| IngredientInput { id, amount })
            .collect();
        insert_associations(conn, created.id, tags, &ingredients)?;
        AppResult::Ok(created)
    })
    .unwrap()
}

#[cfg(test)]
fn payload(value: serde_json::Value) -> RecipePayload {
    serde_json::from_value(value).unwrap()
}

#[cfg(test)]
fn count_rows(conn: &mut database::Connection) -> (i64, i64, i64) {
    use database::schema::{ingredient_amounts, recipes, tag_recipes};

    (
        recipes::table.count().get_result(conn).unwrap(),
        tag_recipes::table.count().get_result(conn).unwrap(),
        ingredient_amounts::table.count().get_result(conn).unwrap(),
    )
}

#[test]
fn validation_collects_field_errors() {
    let errors = match validate(payload(serde_json::json!({"ingredients": []})), true) {
        Err(AppError::Validation(fields)) => fields,
        _ => panic!("expected a validation error"),
    };
    for field in ["cooking_time", "image", "ingredients", "name", "tags", "text"] {
        assert!(errors.contains_key(field), "missing error for {field}");
    }

    let bad_numbers = payload(serde_json::json!({
        "tags": [1, 1],
        "ingredients": [{"id": 1, "amount": 0}, {"id": 1, "amount": 3}],
        "cooking_time": 0,
    }));
    match validate(bad_numbers, false) {
        Err(AppError::Validation(fields)) => {
            assert_eq!(fields["ingredients"].len(), 2);
            assert!(fields.contains_key("tags"));
            assert!(fields.contains_key("cooking_time"));
            assert!(!fields.contains_key("image"));
        }
        _ => panic!("expected a validation error"),
    }
}

#[test]
fn create_and_fetch() {
    use crate::catalog::{ingredient_for_test, tag_for_test};

    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();
    let media = images::temp_media_root();

    let author = crate::users::signup_for_test(conn, "chef");
    let lunch = tag_for_test(conn, "lunch");
    let rice = ingredient_for_test(conn, "rice", "g");

    let view = create_recipe(
        conn,
        &media,
        &author,
        payload(serde_json::json!({
            "tags": [lunch.id],
            "ingredients": [{"id": rice.id, "amount": 200}],
            "name": "  Plain rice ",
            "image": images::TINY_PNG,
            "text": "boil",
            "cooking_time": 20,
        })),
    )
    .unwrap();

    assert_eq!(view.name, "Plain rice");
    assert_eq!(view.tags, vec![lunch]);
    assert_eq!(
        view.ingredients,
        vec![RecipeIngredientView {
            id: rice.id,
            name: "rice".into(),
            measurement_unit: "g".into(),
            amount: 200,
        }]
    );
    assert_eq!(view.author.id, author.id);
    assert!(!view.is_favorited);
    assert!(!view.is_in_shopping_cart);
    let stored = view.image.strip_prefix(images::MEDIA_URL).unwrap();
    assert!(media.join(stored).exists());

    let fetched = get_recipe(conn, None, view.id).unwrap();
    assert_eq!(fetched.ingredients, view.ingredients);
    std::fs::remove_dir_all(media).unwrap();
}

#[test]
fn create_with_unknown_ingredient_leaves_nothing_behind() {
    use crate::catalog::{ingredient_for_test, tag_for_test};

    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();
    let media = images::temp_media_root();

    let author = crate::users::signup_for_test(conn, "chef");
    let lunch = tag_for_test(conn, "lunch");
    let rice = ingredient_for_test(conn, "rice", "g");
    let before = count_rows(conn);

    let result = create_recipe(
        conn,
        &media,
        &author,
        payload(serde_json::json!({
            "tags": [lunch.id],
            "ingredients": [{"id": rice.id, "amount": 200}, {"id": 9999, "amount": 1}],
            "name": "Ghost",
            "image": images::TINY_PNG,
            "text": "boil",
            "cooking_time": 20,
        })),
    );
    match result {
        Err(AppError::NotFound(message)) => assert_eq!(message, "ingredient 9999 not found"),
        other => panic!("expected not found, got {other:?}"),
    }
    assert_eq!(count_rows(conn), before);

    let unknown_tag = create_recipe(
        conn,
        &media,
        &author,
        payload(serde_json::json!({
            "tags": [lunch.id, 4242],
            "ingredients": [{"id": rice.id, "amount": 200}],
            "name": "Ghost",
            "image": images::TINY_PNG,
            "text": "boil",
            "cooking_time": 20,
        })),
    );
    assert!(matches!(unknown_tag, Err(AppError::NotFound(_))));
    assert_eq!(count_rows(conn), before);

    // the image written before the failed transaction is cleaned up too
    let leftovers = std::fs::read_dir(media.join("recipes/images"))
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
    std::fs::remove_dir_all(media).unwrap();
}

#[test]
fn update_replaces_associations() {
    use crate::catalog::{ingredient_for_test, tag_for_test};

    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();
    let media = images::temp_media_root();

    let author = crate::users::signup_for_test(conn, "chef");
    let a = tag_for_test(conn, "a");
    let b = tag_for_test(conn, "b");
    let c = tag_for_test(conn, "c");
    let oats = ingredient_for_test(conn, "oats", "g");
    let milk = ingredient_for_test(conn, "milk", "ml");
    let recipe = recipe_for_test(conn, &author, "porridge", &[a.id, b.id], &[(oats.id, 50)]);

    let view = update_recipe(
        conn,
        &media,
        &author,
        recipe.id,
        payload(serde_json::json!({
            "tags": [b.id, c.id],
            "ingredients": [{"id": milk.id, "amount": 250}],
            "cooking_time": 7,
        })),
    )
    .unwrap();

    assert_eq!(
        view.tags.iter().map(|t| t.slug.as_str()).collect::<Vec<_>>(),
        vec!["b", "c"]
    );
    assert_eq!(view.ingredients.len(), 1);
    assert_eq!(view.ingredients[0].id, milk.id);
    assert_eq!(view.cooking_time, 7);
    assert_eq!(view.name, "porridge");
    assert_eq!(count_rows(conn), (1, 2, 1));

    // a failing update keeps the previous associations
    let failed = update_recipe(
        conn,
        &media,
        &author,
        recipe.id,
        payload(serde_json::json!({
            "tags": [a.id],
            "ingredients": [{"id": 777, "amount": 1}],
            "name": "renamed",
        })),
    );
    assert!(matches!(failed, Err(AppError::NotFound(_))));
    let unchanged = get_recipe(conn, None, recipe.id).unwrap();
    assert_eq!(unchanged.name, "porridge");
    assert_eq!(unchanged.tags.len(), 2);
    std::fs::remove_dir_all(media).unwrap();
}

#[test]
fn only_author_or_admin_may_edit() {
    use crate::catalog::{admin_for_test, ingredient_for_test};

    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();
    let media = images::temp_media_root();

    let author = crate::users::signup_for_test(conn, "chef");
    let stranger = crate::users::signup_for_test(conn, "stranger");
    let admin = admin_for_test(conn, "boss");
    let egg = ingredient_for_test(conn, "egg", "pcs");
    let recipe = recipe_for_test(conn, &author, "omelette", &[], &[(egg.id, 2)]);

    let edit = || {
        payload(serde_json::json!({
            "tags": [],
            "ingredients": [{"id": egg.id, "amount": 3}],
        }))
    };
    assert!(matches!(
        update_recipe(conn, &media, &stranger, recipe.id, edit()),
        Err(AppError::Forbidden)
    ));
    assert!(update_recipe(conn, &media, &admin, recipe.id, edit()).is_ok());
    assert!(matches!(
        delete_recipe(conn, &media, &stranger, recipe.id),
        Err(AppError::Forbidden)
    ));
    delete_recipe(conn, &media, &author, recipe.id).unwrap();
    assert_eq!(count_rows(conn), (0, 0, 0));
    std::fs::remove_dir_all(media).unwrap();
}

#[test]
fn tag_filter_is_a_union() {
    use crate::catalog::{ingredient_for_test, tag_for_test};
    use maplit::hashset;

    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let author = crate::users::signup_for_test(conn, "chef");
    let breakfast = tag_for_test(conn, "breakfast");
    let dinner = tag_for_test(conn, "dinner");
    let dessert = tag_for_test(conn, "dessert");
    let egg = ingredient_for_test(conn, "egg", "pcs");

    let eggs = recipe_for_test(conn, &author, "eggs", &[breakfast.id], &[(egg.id, 2)]);
    let steak = recipe_for_test(conn, &author, "steak", &[dinner.id], &[(egg.id, 1)]);
    let both = recipe_for_test(
        conn,
        &author,
        "brinner",
        &[breakfast.id, dinner.id],
        &[(egg.id, 3)],
    );
    recipe_for_test(conn, &author, "cake", &[dessert.id], &[(egg.id, 4)]);

    let filter = RecipeFilter {
        tags: vec!["breakfast".into(), "dinner".into()],
        ..Default::default()
    };
    let (count, views) = list_recipes(conn, None, &filter, PageRequest::first(10)).unwrap();
    assert_eq!(count, 3);
    assert_eq!(
        views.iter().map(|v| v.id).collect::<HashSet<_>>(),
        hashset! {eggs.id, steak.id, both.id}
    );

    let (count, page) = list_recipes(
        conn,
        None,
        &RecipeFilter::default(),
        PageRequest { page: 2, limit: 3 },
    )
    .unwrap();
    assert_eq!(count, 4);
    assert_eq!(page.len(), 1);
}

#[test]
fn favorite_and_cart_flags_follow_the_viewer() {
    use crate::catalog::ingredient_for_test;
    use crate::relations::{add_favorite, add_to_cart};

    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let author = crate::users::signup_for_test(conn, "chef");
    let fan = crate::users::signup_for_test(conn, "fan");
    let egg = ingredient_for_test(conn, "egg", "pcs");
    let liked = recipe_for_test(conn, &author, "liked", &[], &[(egg.id, 1)]);
    let carted = recipe_for_test(conn, &author, "carted", &[], &[(egg.id, 1)]);

    add_favorite(conn, fan.id, liked.id).unwrap();
    add_to_cart(conn, fan.id, carted.id).unwrap();

    let favorites = RecipeFilter {
        is_favorited: true,
        ..Default::default()
    };
    let (count, views) = list_recipes(conn, Some(fan.id), &favorites, PageRequest::first(10)).unwrap();
    assert_eq!(count, 1);
    assert_eq!(views[0].id, liked.id);
    assert!(views[0].is_favorited);
    assert!(!views[0].is_in_shopping_cart);

    let cart = RecipeFilter {
        is_in_shopping_cart: true,
        ..Default::default()
    };
    let (_, views) = list_recipes(conn, Some(fan.id), &cart, PageRequest::first(10)).unwrap();
    assert_eq!(views.len(), 1);
    assert!(views[0].is_in_shopping_cart);

    // flags are per viewer
    let seen_by_author = get_recipe(conn, Some(author.id), liked.id).unwrap();
    assert!(!seen_by_author.is_favorited);
    assert_eq!(list_recipes(conn, None, &favorites, PageRequest::first(10)).unwrap().0, 0);
}
