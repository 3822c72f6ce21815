// Copyright 2023 Remi Bernotavicius

//! Loads catalog fixtures (ingredients and tags) from JSON files.

use crate::catalog;
use crate::database::{
    self,
    models::{IngredientChanges, TagChanges},
};
use crate::Result;
use diesel::Connection as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use serde::Deserialize;
use std::path::Path;

const BATCH_SIZE: usize = 100;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct IngredientFixture {
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TagFixture {
    pub name: String,
    pub color: String,
    pub slug: String,
}

pub trait Fixture: Sized {
    const KIND: &'static str;

    /// Inserts the entry unless an equal one is already present. Returns whether
    /// anything was written.
    fn insert(self, conn: &mut database::Connection) -> Result<bool>;
}

impl Fixture for IngredientFixture {
    const KIND: &'static str = "ingredients";

    fn insert(self, conn: &mut database::Connection) -> Result<bool> {
        use database::schema::ingredients::dsl::*;

        let changes = IngredientChanges {
            name: Some(self.name.clone()),
            measurement_unit: Some(self.measurement_unit),
        }
        .trimmed();
        catalog::validate_ingredient(&changes, true)
            .map_err(|e| format!("ingredient {:?}: {e}", self.name))?;

        let existing: i64 = ingredients
            .filter(name.eq(changes.name.as_deref().unwrap_or_default()))
            .filter(measurement_unit.eq(changes.measurement_unit.as_deref().unwrap_or_default()))
            .count()
            .get_result(conn)?;
        if existing > 0 {
            return Ok(false);
        }
        diesel::insert_into(ingredients).values(&changes).execute(conn)?;
        Ok(true)
    }
}

impl Fixture for TagFixture {
    const KIND: &'static str = "tags";

    fn insert(self, conn: &mut database::Connection) -> Result<bool> {
        use database::schema::tags::dsl::*;

        let changes = TagChanges {
            name: Some(self.name),
            color: Some(self.color),
            slug: Some(self.slug.clone()),
        }
        .trimmed();
        catalog::validate_tag(&changes, true).map_err(|e| format!("tag {:?}: {e}", self.slug))?;

        let wanted = changes.slug.as_deref().unwrap_or_default();
        let existing: i64 = tags.filter(slug.eq(wanted)).count().get_result(conn)?;
        if existing > 0 {
            return Ok(false);
        }
        catalog::insert_tag(conn, &changes).map_err(|e| format!("tag {:?}: {e}", self.slug))?;
        Ok(true)
    }
}

pub struct FixtureImporter<T> {
    remaining: Vec<T>,
    total: usize,
    num_imported: usize,
    num_skipped: usize,
}

impl<T: Fixture + for<'de> Deserialize<'de>> FixtureImporter<T> {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| format!("failed to open {}: {e}", path.display()))?;
        let entries: Vec<T> = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(mut entries: Vec<T>) -> Self {
        // batches are taken off the end
        entries.reverse();
        Self {
            total: entries.len(),
            remaining: entries,
            num_imported: 0,
            num_skipped: 0,
        }
    }

    pub fn done(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn num_imported(&self) -> usize {
        self.num_imported
    }

    pub fn num_skipped(&self) -> usize {
        self.num_skipped
    }

    pub fn percent_done(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        (self.total - self.remaining.len()) as f32 / self.total as f32
    }

    /// Writes one batch in its own transaction.
    pub fn import_one(&mut self, conn: &mut database::Connection) -> Result<()> {
        let split_point = self.remaining.len().saturating_sub(BATCH_SIZE);
        let mut batch = self.remaining.split_off(split_point);
        batch.reverse();

        let (imported, skipped) = conn.transaction(|conn| {
            let mut imported = 0;
            let mut skipped = 0;
            for entry in batch {
                if entry.insert(conn)? {
                    imported += 1;
                } else {
                    skipped += 1;
                }
            }
            Result::Ok((imported, skipped))
        })?;
        self.num_imported += imported;
        self.num_skipped += skipped;
        Ok(())
    }
}

pub fn import_fixtures<T: Fixture + for<'de> Deserialize<'de>>(
    conn: &mut database::Connection,
    path: impl AsRef<Path>,
) -> Result<()> {
    let mut importer = FixtureImporter::<T>::new(path)?;

    while !importer.done() {
        importer.import_one(conn)?;
        log::info!("{}: imported {:.0}%", T::KIND, importer.percent_done() * 100.0);
    }
    log::info!(
        "{}: {} added, {} already present",
        T::KIND,
        importer.num_imported(),
        importer.num_skipped()
    );
    Ok(())
}

#[test]
fn ingredients_load_once() {
    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let entries: Vec<IngredientFixture> = serde_json::from_str(
        r#"[
            {"name": "abricot", "measurement_unit": "g"},
            {"name": "salt", "measurement_unit": "g"},
            {"name": "salt", "measurement_unit": "pinch"}
        ]"#,
    )
    .unwrap();

    let mut importer = FixtureImporter::from_entries(entries.clone());
    while !importer.done() {
        importer.import_one(conn).unwrap();
    }
    assert_eq!(importer.num_imported(), 3);
    assert_eq!(importer.percent_done(), 1.0);

    let mut again = FixtureImporter::from_entries(entries);
    again.import_one(conn).unwrap();
    assert_eq!(again.num_imported(), 0);
    assert_eq!(again.num_skipped(), 3);

    let names: Vec<_> = catalog::list_ingredients(conn, None)
        .unwrap()
        .into_iter()
        .map(|i| (i.name, i.measurement_unit))
        .collect();
    assert_eq!(
        names,
        vec![
            ("abricot".into(), "g".into()),
            ("salt".into(), "g".into()),
            ("salt".into(), "pinch".into())
        ]
    );
}

#[test]
fn bad_tag_rolls_back_its_batch() {
    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let entries: Vec<TagFixture> = serde_json::from_str(
        r##"[
            {"name": "Breakfast", "color": "#E26C2D", "slug": "breakfast"},
            {"name": "Lunch", "color": "green", "slug": "lunch"}
        ]"##,
    )
    .unwrap();
    let mut importer = FixtureImporter::from_entries(entries);
    assert!(importer.import_one(conn).is_err());
    assert!(catalog::list_tags(conn).unwrap().is_empty());
}

#[test]
fn large_files_are_split_into_batches() {
    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let entries: Vec<_> = (0..BATCH_SIZE + 5)
        .map(|i| IngredientFixture {
            name: format!("ingredient {i:03}"),
            measurement_unit: "g".into(),
        })
        .collect();
    let mut importer = FixtureImporter::from_entries(entries);

    importer.import_one(conn).unwrap();
    assert!(!importer.done());
    assert_eq!(importer.num_imported(), BATCH_SIZE);
    importer.import_one(conn).unwrap();
    assert!(importer.done());

    let first = catalog::list_ingredients(conn, None).unwrap().remove(0);
    assert_eq!(first.name, "ingredient 000");
    assert_eq!(first.id, database::models::IngredientId::from(1));
}
