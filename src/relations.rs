// Copyright 2023 Remi Bernotavicius

//! Favorites, the shopping cart and author subscriptions.

use crate::database::{
    self,
    models::{NewFavorite, NewFollow, NewShoppingCartEntry, RecipeId, User, UserId},
};
use crate::error::{AppError, AppResult};
use crate::pagination::PageRequest;
use crate::recipes::{recipe_summary, recipes_by_author, RecipeSummary};
use crate::users::{get_user, UserView};
use diesel::ExpressionMethods as _;
use diesel::JoinOnDsl as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Serialize;

fn favorite_exists(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> AppResult<bool> {
    use database::schema::favorites::dsl::*;

    let count: i64 = favorites
        .filter(user_id.eq(user))
        .filter(recipe_id.eq(recipe))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub fn add_favorite(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> AppResult<RecipeSummary> {
    let summary = recipe_summary(conn, recipe)?;
    if favorite_exists(conn, user, recipe)? {
        return Err(AppError::Conflict(format!(
            "recipe {recipe} is already in favorites"
        )));
    }
    diesel::insert_into(database::schema::favorites::table)
        .values(NewFavorite {
            user_id: user,
            recipe_id: recipe,
        })
        .execute(conn)?;
    log::debug!("user {user} favorited recipe {recipe}");
    Ok(summary)
}

pub fn remove_favorite(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> AppResult<()> {
    use database::schema::favorites::dsl::*;

    let removed = diesel::delete(
        favorites
            .filter(user_id.eq(user))
            .filter(recipe_id.eq(recipe)),
    )
    .execute(conn)?;
    if removed == 0 {
        return Err(AppError::not_found(format_args!(
            "recipe {recipe} in favorites"
        )));
    }
    Ok(())
}

fn in_cart(conn: &mut database::Connection, owner: UserId, recipe: RecipeId) -> AppResult<bool> {
    use database::schema::shopping_cart::dsl::*;

    let count: i64 = shopping_cart
        .filter(owner_id.eq(owner))
        .filter(recipe_id.eq(recipe))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub fn add_to_cart(
    conn: &mut database::Connection,
    owner: UserId,
    recipe: RecipeId,
) -> AppResult<RecipeSummary> {
    let summary = recipe_summary(conn, recipe)?;
    if in_cart(conn, owner, recipe)? {
        return Err(AppError::Conflict(format!(
            "recipe {recipe} is already in the shopping cart"
        )));
    }
    diesel::insert_into(database::schema::shopping_cart::table)
        .values(NewShoppingCartEntry {
            owner_id: owner,
            recipe_id: recipe,
        })
        .execute(conn)?;
    log::debug!("user {owner} put recipe {recipe} in the cart");
    Ok(summary)
}

pub fn remove_from_cart(
    conn: &mut database::Connection,
    owner: UserId,
    recipe: RecipeId,
) -> AppResult<()> {
    use database::schema::shopping_cart::dsl::*;

    let removed = diesel::delete(
        shopping_cart
            .filter(owner_id.eq(owner))
            .filter(recipe_id.eq(recipe)),
    )
    .execute(conn)?;
    if removed == 0 {
        return Err(AppError::not_found(format_args!(
            "recipe {recipe} in the shopping cart"
        )));
    }
    Ok(())
}

/// An author as seen by one of their followers.
#[derive(Serialize, Debug, Clone)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub author: UserView,
    pub recipes: Vec<RecipeSummary>,
    pub recipes_count: i64,
}

fn subscription_view(
    conn: &mut database::Connection,
    author: &User,
    recipes_limit: Option<i64>,
) -> AppResult<SubscriptionView> {
    let (recipes_count, recipes) = recipes_by_author(conn, author.id, recipes_limit)?;
    Ok(SubscriptionView {
        author: UserView::new(author, true),
        recipes,
        recipes_count,
    })
}

pub fn subscribe(
    conn: &mut database::Connection,
    user: UserId,
    author: UserId,
    recipes_limit: Option<i64>,
) -> AppResult<SubscriptionView> {
    use database::schema::follows;

    if user == author {
        return Err(AppError::invalid("author", "you cannot subscribe to yourself"));
    }
    let author = get_user(conn, author)?;
    let existing: i64 = follows::table
        .filter(follows::user_id.eq(user))
        .filter(follows::author_id.eq(author.id))
        .count()
        .get_result(conn)?;
    if existing > 0 {
        return Err(AppError::Conflict(format!(
            "already subscribed to {}",
            author.username
        )));
    }

    diesel::insert_into(follows::table)
        .values(NewFollow {
            user_id: user,
            author_id: author.id,
        })
        .execute(conn)?;
    log::debug!("user {user} subscribed to {}", author.id);
    subscription_view(conn, &author, recipes_limit)
}

pub fn unsubscribe(
    conn: &mut database::Connection,
    user: UserId,
    author: UserId,
) -> AppResult<()> {
    use database::schema::follows::dsl::*;

    let removed = diesel::delete(
        follows
            .filter(user_id.eq(user))
            .filter(author_id.eq(author)),
    )
    .execute(conn)?;
    if removed == 0 {
        return Err(AppError::not_found(format_args!("subscription to user {author}")));
    }
    Ok(())
}

/// Authors `user` follows, most recently followed first.
pub fn subscriptions(
    conn: &mut database::Connection,
    user: UserId,
    page: PageRequest,
    recipes_limit: Option<i64>,
) -> AppResult<(i64, Vec<SubscriptionView>)> {
    use database::schema::{follows, users};

    let count: i64 = follows::table
        .filter(follows::user_id.eq(user))
        .count()
        .get_result(conn)?;
    let authors: Vec<User> = follows::table
        .inner_join(users::table.on(users::id.eq(follows::author_id)))
        .filter(follows::user_id.eq(user))
        .select(User::as_select())
        .order(follows::id.desc())
        .limit(page.limit)
        .offset(page.offset())
        .load(conn)?;

    let views = authors
        .iter()
        .map(|author| subscription_view(conn, author, recipes_limit))
        .collect::<AppResult<Vec<_>>>()?;
    Ok((count, views))
}

#[test]
fn favorites_reject_duplicates_and_missing_rows() {
    use crate::catalog::ingredient_for_test;
    use crate::recipes::recipe_for_test;

    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let cook = crate::users::signup_for_test(conn, "cook");
    let fan = crate::users::signup_for_test(conn, "fan");
    let egg = ingredient_for_test(conn, "egg", "pcs");
    let recipe = recipe_for_test(conn, &cook, "eggs", &[], &[(egg.id, 2)]);

    let summary = add_favorite(conn, fan.id, recipe.id).unwrap();
    assert_eq!(summary.name, "eggs");
    assert_eq!(summary.image, "/media/recipes/images/test.png");
    assert!(matches!(
        add_favorite(conn, fan.id, recipe.id),
        Err(AppError::Conflict(_))
    ));

    let missing = RecipeId::from(999);
    assert!(matches!(
        add_favorite(conn, fan.id, missing),
        Err(AppError::NotFound(_))
    ));

    remove_favorite(conn, fan.id, recipe.id).unwrap();
    match remove_favorite(conn, fan.id, recipe.id) {
        Err(AppError::NotFound(message)) => {
            assert_eq!(message, format!("recipe {} in favorites not found", recipe.id))
        }
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn cart_entries_are_per_owner() {
    use crate::catalog::ingredient_for_test;
    use crate::recipes::recipe_for_test;

    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let cook = crate::users::signup_for_test(conn, "cook");
    let shopper = crate::users::signup_for_test(conn, "shopper");
    let egg = ingredient_for_test(conn, "egg", "pcs");
    let recipe = recipe_for_test(conn, &cook, "eggs", &[], &[(egg.id, 2)]);

    add_to_cart(conn, shopper.id, recipe.id).unwrap();
    add_to_cart(conn, cook.id, recipe.id).unwrap();
    assert!(matches!(
        add_to_cart(conn, shopper.id, recipe.id),
        Err(AppError::Conflict(_))
    ));

    remove_from_cart(conn, shopper.id, recipe.id).unwrap();
    assert!(matches!(
        remove_from_cart(conn, shopper.id, recipe.id),
        Err(AppError::NotFound(_))
    ));
    assert!(in_cart(conn, cook.id, recipe.id).unwrap());
}

#[test]
fn subscriptions_list_followed_authors() {
    use crate::catalog::ingredient_for_test;
    use crate::recipes::recipe_for_test;

    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let reader = crate::users::signup_for_test(conn, "reader");
    let alice = crate::users::signup_for_test(conn, "alice");
    let bob = crate::users::signup_for_test(conn, "bob");
    let egg = ingredient_for_test(conn, "egg", "pcs");
    for name in ["one", "two", "three"] {
        recipe_for_test(conn, &alice, name, &[], &[(egg.id, 1)]);
    }

    assert!(matches!(
        subscribe(conn, reader.id, reader.id, None),
        Err(AppError::Validation(_))
    ));
    let missing = UserId::from(999);
    assert!(matches!(
        subscribe(conn, reader.id, missing, None),
        Err(AppError::NotFound(_))
    ));

    let view = subscribe(conn, reader.id, alice.id, Some(2)).unwrap();
    assert!(view.author.is_subscribed);
    assert_eq!(view.recipes_count, 3);
    assert_eq!(view.recipes.len(), 2);
    assert!(matches!(
        subscribe(conn, reader.id, alice.id, None),
        Err(AppError::Conflict(_))
    ));
    subscribe(conn, reader.id, bob.id, None).unwrap();

    let (count, views) = subscriptions(conn, reader.id, PageRequest::first(10), None).unwrap();
    assert_eq!(count, 2);
    assert_eq!(
        views.iter().map(|v| v.author.username.as_str()).collect::<Vec<_>>(),
        vec!["bob", "alice"]
    );
    assert_eq!(views[1].recipes.len(), 3);
    assert!(views[0].recipes.is_empty());

    let json = serde_json::to_value(&views[1]).unwrap();
    assert_eq!(json["username"], "alice");
    assert_eq!(json["is_subscribed"], true);
    assert_eq!(json["recipes_count"], 3);

    unsubscribe(conn, reader.id, alice.id).unwrap();
    assert!(matches!(
        unsubscribe(conn, reader.id, alice.id),
        Err(AppError::NotFound(_))
    ));
    assert!(
        crate::users::user_view(conn, Some(reader.id), bob.id)
            .unwrap()
            .is_subscribed
    );
}
