use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use serde::Serialize;

use crate::model::{Domain, Entity, Translation, Translations, User};
use crate::password::hash_password;
use crate::schema::find_association;
use crate::store::{initialize_schema, insert_record, link};

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub locale: String,
    pub password_rounds: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    pub translations_id: i64,
    pub translation_id: i64,
    pub user_id: i64,
    pub domain_id: i64,
    pub entity_id: i64,
    pub related_entity_id: i64,
}

/// Create the schema and insert the sample site in one transaction.
pub fn seed_database(connection: &mut Connection, options: &SeedOptions) -> Result<SeedReport> {
    initialize_schema(connection)?;
    let locale = options
        .locale
        .parse()
        .with_context(|| format!("invalid seed locale `{}`", options.locale))?;

    let transaction = connection
        .transaction()
        .context("failed to start seed transaction")?;

    let translations_id = insert_record(&transaction, &Translations)?;
    let mut translation = Translation::new("test", "Test", "Just Testing", locale);
    translation.translations_id = Some(translations_id);
    let translation_id = insert_record(&transaction, &translation)?;

    let user = User {
        name: "test".to_string(),
        display_name_id: Some(translations_id),
        password_hash: hash_password("password1", options.password_rounds)?,
        locale: translation.locale.clone(),
        email: "test@example.com".parse()?,
        country: "GB".parse()?,
        entity_id: None,
    };
    let user_id = insert_record(&transaction, &user)?;

    let domain_id = insert_record(
        &transaction,
        &Domain {
            name: "test".to_string(),
            display_name: "test".to_string(),
            url: "test.com".to_string(),
        },
    )?;

    let entity = Entity {
        name: "test".to_string(),
        route_name: None,
        display_name_id: Some(translations_id),
        domain_id: Some(domain_id),
    };
    let entity_id = insert_record(&transaction, &entity)?;

    let related = Entity {
        domain_id: None,
        ..entity
    };
    let related_entity_id = insert_record(&transaction, &related)?;

    let association = find_association("entityentity")
        .ok_or_else(|| anyhow!("entityentity association is not declared"))?;
    link(
        &transaction,
        association,
        &BTreeMap::from([
            ("entity_one_id", entity_id),
            ("entity_two_id", related_entity_id),
        ]),
    )?;

    transaction
        .commit()
        .context("failed to commit seed transaction")?;
    tracing::info!(user_id, entity_id, domain_id, "seed data written");

    Ok(SeedReport {
        translations_id,
        translation_id,
        user_id,
        domain_id,
        entity_id,
        related_entity_id,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::password::verify_password;
    use crate::runtime::ResolvedPaths;
    use crate::schema::find_model;
    use crate::store::{list_rows, open_or_create, table_counts};
    use crate::values::FieldValue;

    fn options() -> SeedOptions {
        SeedOptions {
            locale: "en_GB".to_string(),
            password_rounds: 10,
        }
    }

    #[test]
    fn seed_writes_sample_site() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_project_root(temp.path());
        let mut connection =
            open_or_create(&paths, std::time::Duration::from_secs(5)).expect("open");

        let report = seed_database(&mut connection, &options()).expect("seed");
        assert_ne!(report.entity_id, report.related_entity_id);

        let counts: BTreeMap<&str, usize> = table_counts(&connection)
            .expect("counts")
            .into_iter()
            .map(|count| (count.table, count.rows))
            .collect();
        assert_eq!(counts["translations"], 1);
        assert_eq!(counts["translation"], 1);
        assert_eq!(counts["user"], 1);
        assert_eq!(counts["domain"], 1);
        assert_eq!(counts["entity"], 2);
        assert_eq!(counts["entityentity"], 1);

        let users = list_rows(&connection, find_model("user").expect("model"), None).expect("list");
        let user = &users[0];
        let field = |name: &str| {
            user.iter()
                .find(|(column, _)| *column == name)
                .map(|(_, value)| value.clone())
                .expect("column")
        };
        assert_eq!(field("email"), FieldValue::Text("test@example.com".to_string()));
        assert_eq!(field("country"), FieldValue::Text("GB".to_string()));
        assert_eq!(field("display_name_id"), FieldValue::Integer(report.translations_id));
        let FieldValue::Text(stored) = field("password") else {
            panic!("password must be text");
        };
        assert!(verify_password("password1", &stored).expect("verify"));
    }

    #[test]
    fn seed_twice_adds_second_set() {
        let mut connection = Connection::open_in_memory().expect("open");
        let first = seed_database(&mut connection, &options()).expect("seed");
        let second = seed_database(&mut connection, &options()).expect("seed again");
        assert!(second.user_id > first.user_id);
    }

    #[test]
    fn seed_rejects_bad_locale() {
        let mut connection = Connection::open_in_memory().expect("open");
        let error = seed_database(
            &mut connection,
            &SeedOptions {
                locale: "nonsense".to_string(),
                password_rounds: 10,
            },
        )
        .expect_err("bad locale");
        assert!(error.to_string().contains("invalid seed locale"));
    }
}
