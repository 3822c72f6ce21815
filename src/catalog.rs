// Copyright 2023 Remi Bernotavicius

//! Tags and ingredients: reference data shared by every recipe and editable by
//! admins only.

use crate::database::{
    self,
    models::{Ingredient, IngredientChanges, IngredientId, Tag, TagChanges, TagId, User},
};
use crate::error::{AppError, AppResult, FieldErrors};
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;

const MAX_NAME_LEN: usize = 200;
const MAX_SLUG_LEN: usize = 50;

pub fn require_admin(user: &User) -> AppResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn is_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn check_name(errors: &mut FieldErrors, field: &'static str, value: Option<&str>, required: bool) {
    match value.map(str::trim) {
        None if required => errors
            .entry(field)
            .or_default()
            .push("this field is required".into()),
        Some("") => errors
            .entry(field)
            .or_default()
            .push("may not be blank".into()),
        Some(v) if v.chars().count() > MAX_NAME_LEN => errors
            .entry(field)
            .or_default()
            .push(format!("must be at most {MAX_NAME_LEN} characters")),
        _ => {}
    }
}

/// `required` is set for creation, where every column must be supplied.
pub fn validate_tag(changes: &TagChanges, required: bool) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    check_name(&mut errors, "name", changes.name.as_deref(), required);
    match changes.color.as_deref() {
        None if required => errors
            .entry("color")
            .or_default()
            .push("this field is required".into()),
        Some(color) if !is_hex_color(color) => errors
            .entry("color")
            .or_default()
            .push("must be a HEX color such as #E26C2D".into()),
        _ => {}
    }
    match changes.slug.as_deref() {
        None if required => errors
            .entry("slug")
            .or_default()
            .push("this field is required".into()),
        Some(slug) if !is_slug(slug) => errors.entry("slug").or_default().push(format!(
            "must be 1 to {MAX_SLUG_LEN} letters, digits, hyphens or underscores"
        )),
        _ => {}
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

pub fn validate_ingredient(changes: &IngredientChanges, required: bool) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    check_name(&mut errors, "name", changes.name.as_deref(), required);
    check_name(
        &mut errors,
        "measurement_unit",
        changes.measurement_unit.as_deref(),
        required,
    );
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn slug_taken(
    conn: &mut database::Connection,
    wanted: &str,
    except: Option<TagId>,
) -> AppResult<bool> {
    use database::schema::tags::dsl::*;

    let mut query = tags.filter(slug.eq(wanted)).into_boxed();
    if let Some(except) = except {
        query = query.filter(id.ne(except));
    }
    let count: i64 = query.count().get_result(conn)?;
    Ok(count > 0)
}

pub fn list_tags(conn: &mut database::Connection) -> AppResult<Vec<Tag>> {
    use database::schema::tags::dsl::*;

    Ok(tags.select(Tag::as_select()).order(id).load(conn)?)
}

pub fn get_tag(conn: &mut database::Connection, tag_id: TagId) -> AppResult<Tag> {
    use database::schema::tags::dsl::*;

    tags.find(tag_id)
        .select(Tag::as_select())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found(format_args!("tag {tag_id}")))
}

pub fn create_tag(conn: &mut database::Connection, user: &User, new: &TagChanges) -> AppResult<Tag> {
    require_admin(user)?;
    let new = &new.trimmed();
    validate_tag(new, true)?;
    insert_tag(conn, new)
}

pub(crate) fn insert_tag(conn: &mut database::Connection, new: &TagChanges) -> AppResult<Tag> {
    if let Some(wanted) = &new.slug {
        if slug_taken(conn, wanted, None)? {
            return Err(AppError::Conflict(format!("tag slug {wanted:?} already exists")));
        }
    }
    Ok(diesel::insert_into(database::schema::tags::table)
        .values(new)
        .returning(Tag::as_returning())
        .get_result(conn)?)
}

pub fn update_tag(
    conn: &mut database::Connection,
    user: &User,
    tag_id: TagId,
    changes: &TagChanges,
) -> AppResult<Tag> {
    use database::schema::tags::dsl::*;

    require_admin(user)?;
    let changes = &changes.trimmed();
    validate_tag(changes, false)?;
    let existing = get_tag(conn, tag_id)?;
    if changes.name.is_none() && changes.color.is_none() && changes.slug.is_none() {
        return Ok(existing);
    }
    if let Some(wanted) = &changes.slug {
        if slug_taken(conn, wanted, Some(tag_id))? {
            return Err(AppError::Conflict(format!("tag slug {wanted:?} already exists")));
        }
    }
    Ok(diesel::update(tags.find(tag_id))
        .set(changes)
        .returning(Tag::as_returning())
        .get_result(conn)?)
}

pub fn delete_tag(conn: &mut database::Connection, user: &User, tag_id: TagId) -> AppResult<()> {
    use database::schema::tags::dsl::*;

    require_admin(user)?;
    let deleted = diesel::delete(tags.find(tag_id)).execute(conn)?;
    if deleted == 0 {
        return Err(AppError::not_found(format_args!("tag {tag_id}")));
    }
    log::info!("user {} deleted tag {tag_id}", user.id);
    Ok(())
}

/// All ingredients, or those whose name starts with `prefix` (case-insensitive for ASCII).
pub fn list_ingredients(
    conn: &mut database::Connection,
    prefix: Option<&str>,
) -> AppResult<Vec<Ingredient>> {
    use database::schema::ingredients::dsl::*;
    use diesel::expression_methods::{EscapeExpressionMethods as _, TextExpressionMethods as _};

    let mut query = ingredients
        .select(Ingredient::as_select())
        .order((name, id))
        .into_boxed();
    if let Some(prefix) = prefix.map(str::trim).filter(|p| !p.is_empty()) {
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        query = query.filter(name.like(format!("{escaped}%")).escape('\\'));
    }
    Ok(query.load(conn)?)
}

pub fn get_ingredient(
    conn: &mut database::Connection,
    ingredient_id: IngredientId,
) -> AppResult<Ingredient> {
    use database::schema::ingredients::dsl::*;

    ingredients
        .find(ingredient_id)
        .select(Ingredient::as_select())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found(format_args!("ingredient {ingredient_id}")))
}

pub fn create_ingredient(
    conn: &mut database::Connection,
    user: &User,
    new: &IngredientChanges,
) -> AppResult<Ingredient> {
    require_admin(user)?;
    let new = &new.trimmed();
    validate_ingredient(new, true)?;
    Ok(diesel::insert_into(database::schema::ingredients::table)
        .values(new)
        .returning(Ingredient::as_returning())
        .get_result(conn)?)
}

pub fn update_ingredient(
    conn: &mut database::Connection,
    user: &User,
    ingredient_id: IngredientId,
    changes: &IngredientChanges,
) -> AppResult<Ingredient> {
    use database::schema::ingredients::dsl::*;

    require_admin(user)?;
    let changes = &changes.trimmed();
    validate_ingredient(changes, false)?;
    let existing = get_ingredient(conn, ingredient_id)?;
    if changes.name.is_none() && changes.measurement_unit.is_none() {
        return Ok(existing);
    }
    Ok(diesel::update(ingredients.find(ingredient_id))
        .set(changes)
        .returning(Ingredient::as_returning())
        .get_result(conn)?)
}

pub fn delete_ingredient(
    conn: &mut database::Connection,
    user: &User,
    ingredient_id: IngredientId,
) -> AppResult<()> {
    use database::schema::ingredients::dsl::*;

    require_admin(user)?;
    let deleted = diesel::delete(ingredients.find(ingredient_id)).execute(conn)?;
    if deleted == 0 {
        return Err(AppError::not_found(format_args!("ingredient {ingredient_id}")));
    }
    log::info!("user {} deleted ingredient {ingredient_id}", user.id);
    Ok(())
}

#[cfg(test)]
pub fn admin_for_test(conn: &mut database::Connection, username: &str) -> User {
    let user = crate::users::signup_for_test(conn, username);
    crate::users::set_role(conn, &user.email, database::models::UserRole::Admin).unwrap()
}

#[cfg(test)]
pub fn tag_for_test(conn: &mut database::Connection, slug: &str) -> Tag {
    insert_tag(
        conn,
        &TagChanges {
            name: Some(slug.to_uppercase()),
            color: Some("#E26C2D".into()),
            slug: Some(slug.into()),
        },
    )
    .unwrap()
}

#[cfg(test)]
pub fn ingredient_for_test(conn: &mut database::Connection, name: &str, unit: &str) -> Ingredient {
    diesel::insert_into(database::schema::ingredients::table)
        .values(IngredientChanges {
            name: Some(name.into()),
            measurement_unit: Some(unit.into()),
        })
        .returning(Ingredient::as_returning())
        .get_result(conn)
        .unwrap()
}

#[test]
fn tag_validation() {
    let ok = TagChanges {
        name: Some("Breakfast".into()),
        color: Some("#e26c2d".into()),
        slug: Some("breakfast".into()),
    };
    assert!(validate_tag(&ok, true).is_ok());

    let bad = TagChanges {
        name: Some(" ".into()),
        color: Some("red".into()),
        slug: Some("no spaces".into()),
    };
    match validate_tag(&bad, true) {
        Err(AppError::Validation(fields)) => {
            assert_eq!(
                fields.keys().copied().collect::<Vec<_>>(),
                vec!["color", "name", "slug"]
            );
        }
        _ => panic!("expected a validation error"),
    }

    assert!(validate_tag(&TagChanges::default(), false).is_ok());
    assert!(validate_tag(&TagChanges::default(), true).is_err());
}

#[test]
fn only_admins_edit_the_catalog() {
    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let user = crate::users::signup_for_test(conn, "plain");
    let admin = admin_for_test(conn, "boss");
    let new = IngredientChanges {
        name: Some("salt".into()),
        measurement_unit: Some("g".into()),
    };

    assert!(matches!(
        create_ingredient(conn, &user, &new),
        Err(AppError::Forbidden)
    ));
    let salt = create_ingredient(conn, &admin, &new).unwrap();
    assert_eq!(get_ingredient(conn, salt.id).unwrap(), salt);

    assert!(matches!(
        delete_ingredient(conn, &user, salt.id),
        Err(AppError::Forbidden)
    ));
    delete_ingredient(conn, &admin, salt.id).unwrap();
    assert!(matches!(
        get_ingredient(conn, salt.id),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn duplicate_slug_conflicts() {
    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let admin = admin_for_test(conn, "boss");
    let lunch = tag_for_test(conn, "lunch");
    let dinner = tag_for_test(conn, "dinner");

    let again = TagChanges {
        name: Some("Lunch".into()),
        color: Some("#000000".into()),
        slug: Some("lunch".into()),
    };
    assert!(matches!(
        create_tag(conn, &admin, &again),
        Err(AppError::Conflict(_))
    ));

    let rename = TagChanges {
        slug: Some("lunch".into()),
        ..Default::default()
    };
    assert!(matches!(
        update_tag(conn, &admin, dinner.id, &rename),
        Err(AppError::Conflict(_))
    ));
    // keeping its own slug is not a conflict
    let recolor = TagChanges {
        color: Some("#FFFFFF".into()),
        slug: Some("lunch".into()),
        ..Default::default()
    };
    let updated = update_tag(conn, &admin, lunch.id, &recolor).unwrap();
    assert_eq!(updated.color, "#FFFFFF");
    assert_eq!(list_tags(conn).unwrap().len(), 2);
}

#[test]
fn ingredient_prefix_search() {
    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    ingredient_for_test(conn, "sugar", "g");
    ingredient_for_test(conn, "Sugar syrup", "ml");
    ingredient_for_test(conn, "brown sugar", "g");
    ingredient_for_test(conn, "50% cream", "ml");

    let names = |found: Vec<Ingredient>| found.into_iter().map(|i| i.name).collect::<Vec<_>>();
    assert_eq!(
        names(list_ingredients(conn, Some("sug")).unwrap()),
        vec!["Sugar syrup", "sugar"]
    );
    assert_eq!(names(list_ingredients(conn, Some("50%")).unwrap()), vec!["50% cream"]);
    assert_eq!(list_ingredients(conn, None).unwrap().len(), 4);
}

#[test]
fn names_are_stored_trimmed() {
    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();
    let admin = admin_for_test(conn, "boss");

    let salt = create_ingredient(
        conn,
        &admin,
        &IngredientChanges {
            name: Some("  salt ".into()),
            measurement_unit: Some(" g".into()),
        },
    )
    .unwrap();
    assert_eq!((salt.name.as_str(), salt.measurement_unit.as_str()), ("salt", "g"));

    let tag = create_tag(
        conn,
        &admin,
        &TagChanges {
            name: Some(" Lunch ".into()),
            color: Some("#E26C2D".into()),
            slug: Some("lunch".into()),
        },
    )
    .unwrap();
    assert_eq!(tag.name, "Lunch");

    let renamed = TagChanges {
        name: Some("Dinner  ".into()),
        ..Default::default()
    };
    assert_eq!(update_tag(conn, &admin, tag.id, &renamed).unwrap().name, "Dinner");
}
