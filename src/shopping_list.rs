// Copyright 2023 Remi Bernotavicius

//! Sums the ingredient amounts of every recipe in a user's cart.

use crate::database::{
    self,
    models::{Ingredient, IngredientAmount, IngredientId, UserId},
};
use crate::error::AppResult;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListItem {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
    pub total: i64,
}

impl fmt::Display for ShoppingListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) – {}", self.name, self.measurement_unit, self.total)
    }
}

/// Groups rows by ingredient and sums their amounts. Ordered by name, then id.
fn aggregate(rows: Vec<(IngredientAmount, Ingredient)>) -> Vec<ShoppingListItem> {
    let mut totals: BTreeMap<IngredientId, ShoppingListItem> = BTreeMap::new();
    for (usage, i) in rows {
        totals
            .entry(i.id)
            .or_insert_with(|| ShoppingListItem {
                ingredient_id: i.id,
                name: i.name,
                measurement_unit: i.measurement_unit,
                total: 0,
            })
            .total += i64::from(usage.amount);
    }

    let mut items: Vec<_> = totals.into_values().collect();
    items.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then(a.ingredient_id.cmp(&b.ingredient_id))
    });
    items
}

pub fn shopping_list(
    conn: &mut database::Connection,
    owner: UserId,
) -> AppResult<Vec<ShoppingListItem>> {
    use database::schema::{ingredient_amounts, ingredients, shopping_cart};

    let cart_recipes = shopping_cart::table
        .filter(shopping_cart::owner_id.eq(owner))
        .select(shopping_cart::recipe_id);

    let rows = ingredient_amounts::table
        .inner_join(ingredients::table)
        .filter(ingredient_amounts::recipe_id.eq_any(cart_recipes))
        .select((IngredientAmount::as_select(), Ingredient::as_select()))
        .load(conn)?;

    let items = aggregate(rows);
    log::debug!("shopping list for user {owner}: {} ingredients", items.len());
    Ok(items)
}

pub fn shopping_list_lines(
    conn: &mut database::Connection,
    owner: UserId,
) -> AppResult<Vec<String>> {
    Ok(shopping_list(conn, owner)?
        .iter()
        .map(ToString::to_string)
        .collect())
}

#[test]
fn shopping_list_item() {
    let item = ShoppingListItem {
        ingredient_id: IngredientId::from(1),
        name: "tomatoes".into(),
        measurement_unit: "g".into(),
        total: 350,
    };
    assert_eq!(item.to_string(), "tomatoes (g) – 350");
}

#[cfg(test)]
fn usage(id: i32, recipe: i32, ingredient: &Ingredient, amount: i32) -> (IngredientAmount, Ingredient) {
    (
        IngredientAmount {
            id: id.into(),
            recipe_id: recipe.into(),
            ingredient_id: ingredient.id,
            amount,
        },
        ingredient.clone(),
    )
}

#[cfg(test)]
fn ingredient(id: i32, name: &str, unit: &str) -> Ingredient {
    Ingredient {
        id: id.into(),
        name: name.into(),
        measurement_unit: unit.into(),
    }
}

#[test]
fn aggregate_sums_per_ingredient() {
    let flour = ingredient(1, "flour", "g");
    let eggs = ingredient(2, "eggs", "pcs");
    let rows = vec![
        usage(1, 1, &flour, 10),
        usage(2, 2, &flour, 20),
        usage(3, 2, &eggs, 2),
        usage(4, 3, &flour, 5),
    ];

    let lines: Vec<_> = aggregate(rows).iter().map(ToString::to_string).collect();
    assert_eq!(lines, vec!["eggs (pcs) – 2", "flour (g) – 35"]);
}

#[test]
fn aggregate_keeps_same_name_ingredients_apart() {
    let milk_ml = ingredient(1, "milk", "ml");
    let milk_cup = ingredient(2, "milk", "cup");
    let rows = vec![usage(1, 1, &milk_cup, 1), usage(2, 1, &milk_ml, 200)];

    let items = aggregate(rows);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].to_string(), "milk (ml) – 200");
    assert_eq!(items[1].to_string(), "milk (cup) – 1");
    assert!(aggregate(vec![]).is_empty());
}

#[test]
fn cart_totals_from_database() {
    use crate::catalog::ingredient_for_test;
    use crate::recipes::recipe_for_test;
    use crate::relations::add_to_cart;

    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let cook = crate::users::signup_for_test(conn, "cook");
    let shopper = crate::users::signup_for_test(conn, "shopper");
    let butter = ingredient_for_test(conn, "butter", "g");
    let sugar = ingredient_for_test(conn, "sugar", "g");
    let salt = ingredient_for_test(conn, "salt", "g");

    assert!(shopping_list(conn, shopper.id).unwrap().is_empty());

    let cake = recipe_for_test(conn, &cook, "cake", &[], &[(butter.id, 10), (sugar.id, 7)]);
    let cookies = recipe_for_test(conn, &cook, "cookies", &[], &[(butter.id, 20)]);
    // not in the cart, so its salt never shows up
    recipe_for_test(conn, &cook, "brine", &[], &[(salt.id, 50)]);

    add_to_cart(conn, shopper.id, cake.id).unwrap();
    add_to_cart(conn, shopper.id, cookies.id).unwrap();

    let lines = shopping_list_lines(conn, shopper.id).unwrap();
    assert_eq!(lines, vec!["butter (g) – 30", "sugar (g) – 7"]);

    // the cook's own cart is independent
    assert!(shopping_list(conn, cook.id).unwrap().is_empty());
}
