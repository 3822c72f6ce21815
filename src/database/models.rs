// Copyright 2023 Remi Bernotavicius

use derive_more::{Display, From};
use diesel::associations::{Associations, Identifiable};
use diesel::deserialize::Queryable;
use diesel::expression::Selectable;
use diesel::prelude::{AsChangeset, Insertable};
use diesel_derive_enum::DbEnum;
use diesel_derive_newtype::DieselNewType;
use serde::{Deserialize, Serialize};
use strum::EnumString;

#[derive(
    DieselNewType, Debug, Display, From, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(i32);

#[derive(Debug, Display, EnumString, Hash, Copy, Clone, PartialEq, Eq, DbEnum, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[display("user")]
    User,
    #[display("admin")]
    Admin,
}

#[derive(Queryable, Selectable, Identifiable, Clone, Debug)]
#[diesel(table_name = crate::database::schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub confirmation_code: String,
    pub role: UserRole,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub confirmation_code: &'a str,
}

#[derive(Queryable, Selectable, Insertable, Clone)]
#[diesel(table_name = crate::database::schema::auth_tokens)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AuthToken {
    pub key: String,
    pub user_id: UserId,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(
    DieselNewType, Debug, Display, From, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TagId(i32);

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, PartialEq, Serialize)]
#[diesel(table_name = crate::database::schema::tags)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
    pub slug: String,
}

/// Writable tag columns, shared by create and partial update.
#[derive(Insertable, AsChangeset, Deserialize, Default, Debug)]
#[diesel(table_name = crate::database::schema::tags)]
pub struct TagChanges {
    pub name: Option<String>,
    pub color: Option<String>,
    pub slug: Option<String>,
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value.as_deref().map(|v| v.trim().to_owned())
}

impl TagChanges {
    pub fn trimmed(&self) -> Self {
        Self {
            name: trimmed(&self.name),
            color: trimmed(&self.color),
            slug: trimmed(&self.slug),
        }
    }
}

#[derive(
    DieselNewType, Debug, Display, From, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IngredientId(i32);

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, PartialEq, Serialize)]
#[diesel(table_name = crate::database::schema::ingredients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Insertable, AsChangeset, Deserialize, Default, Debug)]
#[diesel(table_name = crate::database::schema::ingredients)]
pub struct IngredientChanges {
    pub name: Option<String>,
    pub measurement_unit: Option<String>,
}

impl IngredientChanges {
    pub fn trimmed(&self) -> Self {
        Self {
            name: trimmed(&self.name),
            measurement_unit: trimmed(&self.measurement_unit),
        }
    }
}

#[derive(
    DieselNewType, Debug, Display, From, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecipeId(i32);

#[derive(Associations, Queryable, Selectable, Identifiable, Clone, Debug)]
#[diesel(belongs_to(User, foreign_key = author_id))]
#[diesel(table_name = crate::database::schema::recipes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Recipe {
    pub id: RecipeId,
    pub author_id: UserId,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct NewRecipe<'a> {
    pub author_id: UserId,
    pub name: &'a str,
    pub image: &'a str,
    pub text: &'a str,
    pub cooking_time: i32,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct RecipeChanges<'a> {
    pub name: Option<&'a str>,
    pub image: Option<&'a str>,
    pub text: Option<&'a str>,
    pub cooking_time: Option<i32>,
}

#[derive(DieselNewType, Debug, From, Hash, PartialEq, Eq, Copy, Clone)]
pub struct IngredientAmountId(i32);

#[derive(Associations, Queryable, Selectable, Identifiable, Clone, Debug)]
#[diesel(belongs_to(Recipe))]
#[diesel(belongs_to(Ingredient))]
#[diesel(table_name = crate::database::schema::ingredient_amounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IngredientAmount {
    pub id: IngredientAmountId,
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub amount: i32,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::ingredient_amounts)]
pub struct NewIngredientAmount {
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub amount: i32,
}

#[derive(DieselNewType, Debug, Hash, PartialEq, Eq, Copy, Clone)]
pub struct TagRecipeId(i32);

#[derive(Associations, Queryable, Selectable, Identifiable, Clone, Debug)]
#[diesel(belongs_to(Tag))]
#[diesel(belongs_to(Recipe))]
#[diesel(table_name = crate::database::schema::tag_recipes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TagRecipe {
    pub id: TagRecipeId,
    pub tag_id: TagId,
    pub recipe_id: RecipeId,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::tag_recipes)]
pub struct NewTagRecipe {
    pub tag_id: TagId,
    pub recipe_id: RecipeId,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::shopping_cart)]
pub struct NewShoppingCartEntry {
    pub owner_id: UserId,
    pub recipe_id: RecipeId,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::favorites)]
pub struct NewFavorite {
    pub user_id: UserId,
    pub recipe_id: RecipeId,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::follows)]
pub struct NewFollow {
    pub user_id: UserId,
    pub author_id: UserId,
}
