//! Row editor commands generated from the declared data model.
//!
//! `add` and `edit` get one subcommand per model and one flag per column;
//! `link` gets one subcommand per association table. Flags are typed from the
//! column metadata, so malformed values are rejected while parsing.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use pyracms_core::model::NewRow;
use pyracms_core::schema::{
    ASSOCIATIONS, AssociationDef, ColumnDef, ModelDef, find_association, find_model,
};
use pyracms_core::values::{FieldValue, FlagKind, parse_field_value};

pub const ADD: &str = "add";
pub const EDIT: &str = "edit";
pub const LINK: &str = "link";

const ROW_ID: &str = "row_id";
const DRY_RUN: &str = "dry_run";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Add,
    Edit,
}

#[derive(Debug)]
pub enum EditorRequest {
    Add {
        row: NewRow,
        dry_run: bool,
    },
    Edit {
        row: NewRow,
        id: i64,
        dry_run: bool,
    },
    Link {
        association: &'static AssociationDef,
        values: BTreeMap<&'static str, i64>,
    },
    /// No model was named; the caller prints help for this command.
    Help { command: &'static str },
}

impl EditorRequest {
    /// Hash plaintext password columns with the configured cost.
    pub fn hash_passwords(&mut self, rounds: u32) -> Result<()> {
        match self {
            Self::Add { row, .. } | Self::Edit { row, .. } => row.hash_passwords(rounds),
            Self::Link { .. } | Self::Help { .. } => Ok(()),
        }
    }
}

pub fn is_editor_command(name: &str) -> bool {
    matches!(name, ADD | EDIT | LINK)
}

/// Attach the generated `add`, `edit` and `link` trees to `root`.
pub fn augment(root: Command) -> Command {
    root.subcommand(models_command(ADD, "Add a row", Mode::Add))
        .subcommand(models_command(EDIT, "Edit a row by id", Mode::Edit))
        .subcommand(link_command())
}

fn models_command(name: &'static str, about: &'static str, mode: Mode) -> Command {
    pyracms_core::schema::MODELS
        .iter()
        .fold(Command::new(name).about(about), |command, model| {
            command.subcommand(model_command(model, mode))
        })
}

fn model_command(model: &'static ModelDef, mode: Mode) -> Command {
    let mut command = Command::new(model.table)
        .alias(model.name)
        .about(model.about);
    if mode == Mode::Edit {
        command = command.arg(
            Arg::new(ROW_ID)
                .value_name("ID")
                .required(true)
                .value_parser(value_parser!(i64))
                .help(format!("Id of the {} row to edit", model.name)),
        );
    }
    for column in model.columns {
        // `updated` is stamped by the store on every edit.
        if mode == Mode::Edit && (column.primary_key || column.name == "updated") {
            continue;
        }
        command = command.arg(column_arg(column));
    }
    command.arg(
        Arg::new(DRY_RUN)
            .long("dry-run")
            .action(ArgAction::SetTrue)
            .help("Print the row as JSON instead of writing it"),
    )
}

fn column_arg(column: &'static ColumnDef) -> Arg {
    let kind = FlagKind::for_column(column.ty);
    Arg::new(column.name)
        .long(column.name)
        .value_name(kind.value_name())
        .action(ArgAction::Set)
        .value_parser(move |raw: &str| parse_field_value(column, raw))
        .help(column_help(column))
}

fn column_help(column: &ColumnDef) -> String {
    let mut help = format!("{} ({})", column.name, column.ty.as_str());
    if column.primary_key {
        help.push_str(", assigned automatically when omitted");
    }
    if let Some(foreign_key) = column.foreign_key {
        help.push_str(&format!(", references {}.{}", foreign_key.table, foreign_key.column));
    }
    if column.is_timestamp() {
        help.push_str(", defaults to now");
    }
    if FlagKind::for_column(column.ty) == FlagKind::DateTime {
        help.push_str("; accepts YYYY-MM-DD[ HH:MM[:SS]], RFC 3339 or `now`");
    }
    help
}

fn link_command() -> Command {
    ASSOCIATIONS.iter().fold(
        Command::new(LINK).about("Link two rows through an association table"),
        |command, association| {
            let subcommand = association.columns.iter().fold(
                Command::new(association.table).about(association.about),
                |subcommand, column| {
                    let help = match column.foreign_key {
                        Some(foreign_key) => {
                            format!("references {}.{}", foreign_key.table, foreign_key.column)
                        }
                        None => column.name.to_string(),
                    };
                    subcommand.arg(
                        Arg::new(column.name)
                            .long(column.name)
                            .value_name("ID")
                            .required(true)
                            .value_parser(value_parser!(i64))
                            .help(help),
                    )
                },
            );
            command.subcommand(subcommand)
        },
    )
}

/// Turn the matches of one editor command into a request. Passwords stay
/// plaintext until [`EditorRequest::hash_passwords`] runs.
pub fn parse_request(command: &str, matches: &ArgMatches) -> Result<EditorRequest> {
    let command: &'static str = match command {
        ADD => ADD,
        EDIT => EDIT,
        LINK => LINK,
        other => return Err(anyhow!("`{other}` is not an editor command")),
    };
    let Some((target, sub_matches)) = matches.subcommand() else {
        return Ok(EditorRequest::Help { command });
    };

    if command == LINK {
        let association = find_association(target)
            .ok_or_else(|| anyhow!("unknown association `{target}`"))?;
        let mut values = BTreeMap::new();
        for column in association.columns {
            if let Some(value) = sub_matches.get_one::<i64>(column.name) {
                values.insert(column.name, *value);
            }
        }
        return Ok(EditorRequest::Link {
            association,
            values,
        });
    }

    let model = find_model(target).ok_or_else(|| anyhow!("unknown model `{target}`"))?;
    let row = row_from_matches(model, sub_matches)?;
    let dry_run = sub_matches.get_flag(DRY_RUN);
    if command == ADD {
        return Ok(EditorRequest::Add { row, dry_run });
    }
    let id = sub_matches
        .get_one::<i64>(ROW_ID)
        .copied()
        .ok_or_else(|| anyhow!("edit {} requires a row id", model.table))?;
    Ok(EditorRequest::Edit { row, id, dry_run })
}

fn row_from_matches(model: &'static ModelDef, matches: &ArgMatches) -> Result<NewRow> {
    let mut row = NewRow::new(model);
    for column in model.columns {
        if let Ok(Some(value)) = matches.try_get_one::<FieldValue>(column.name) {
            row.set(column.name, value.clone())?;
        }
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use clap::Command;
    use pyracms_core::password::verify_password;
    use pyracms_core::schema::MODELS;

    use super::*;

    fn root() -> Command {
        augment(Command::new("pyracms"))
    }

    fn request(args: &[&str]) -> Result<EditorRequest> {
        let matches = root()
            .try_get_matches_from(std::iter::once("pyracms").chain(args.iter().copied()))
            .map_err(|error| anyhow!(error.to_string()))?;
        let (command, sub_matches) = matches.subcommand().expect("editor command");
        let mut request = parse_request(command, sub_matches)?;
        request.hash_passwords(10)?;
        Ok(request)
    }

    fn help_of(command: &str, model: &str, column: &str) -> String {
        let root = root();
        let arg = root
            .find_subcommand(command)
            .and_then(|command| command.find_subcommand(model))
            .and_then(|model| model.get_arguments().find(|arg| arg.get_long() == Some(column)))
            .unwrap_or_else(|| panic!("missing {command} {model} --{column}"));
        arg.get_help().map(ToString::to_string).unwrap_or_default()
    }

    #[test]
    fn one_subcommand_per_model_and_one_flag_per_column() {
        let root = root();
        let add = root.find_subcommand(ADD).expect("add");
        for model in MODELS {
            let subcommand = add
                .find_subcommand(model.table)
                .unwrap_or_else(|| panic!("missing add {}", model.table));
            for column in model.columns {
                assert!(
                    subcommand
                        .get_arguments()
                        .any(|arg| arg.get_long() == Some(column.name)),
                    "add {} lacks --{}",
                    model.table,
                    column.name
                );
            }
        }
        let edit_user = root
            .find_subcommand(EDIT)
            .and_then(|edit| edit.find_subcommand("user"))
            .expect("edit user");
        assert!(!edit_user.get_arguments().any(|arg| arg.get_long() == Some("id")));
        assert!(!edit_user.get_arguments().any(|arg| arg.get_long() == Some("updated")));
        assert!(edit_user.get_arguments().any(|arg| arg.get_long() == Some("created")));
    }

    #[test]
    fn column_help_describes_references_and_date_forms() {
        let display_name = help_of(ADD, "user", "display_name_id");
        assert!(display_name.contains("references translations.id"), "{display_name}");

        let created = help_of(ADD, "user", "created");
        assert!(created.contains("defaults to now"), "{created}");
        assert!(created.contains("YYYY-MM-DD"), "{created}");
        assert!(created.contains("RFC 3339"), "{created}");

        let id = help_of(ADD, "domain", "id");
        assert!(id.contains("assigned automatically"), "{id}");

        let link_help = root()
            .find_subcommand(LINK)
            .and_then(|link| link.find_subcommand("usergroup"))
            .and_then(|usergroup| {
                usergroup
                    .get_arguments()
                    .find(|arg| arg.get_long() == Some("group_id"))
                    .and_then(|arg| arg.get_help().map(ToString::to_string))
            })
            .expect("link usergroup --group_id help");
        assert!(link_help.contains("references group.id"));
    }

    #[test]
    fn edit_rejects_updated_flag() {
        assert!(request(&["edit", "domain", "1", "--updated", "2000-01-01"]).is_err());
    }

    #[test]
    fn parse_request_leaves_passwords_plain_until_hashed() {
        let matches = root()
            .try_get_matches_from(["pyracms", "add", "user", "--password", "password1"])
            .expect("matches");
        let (command, sub_matches) = matches.subcommand().expect("editor command");
        let mut request = parse_request(command, sub_matches).expect("request");
        let EditorRequest::Add { row, .. } = &request else {
            panic!("expected add request");
        };
        assert_eq!(row.get("password"), Some(&FieldValue::from("password1")));

        request.hash_passwords(10).expect("hash");
        let EditorRequest::Add { row, .. } = &request else {
            panic!("expected add request");
        };
        let Some(FieldValue::Text(stored)) = row.get("password") else {
            panic!("password must be text");
        };
        assert!(verify_password("password1", stored).expect("verify"));
    }

    #[test]
    fn add_parses_typed_flags() {
        let EditorRequest::Add { row, dry_run } = request(&[
            "add",
            "integers",
            "--name",
            "answer",
            "--integer",
            "42",
            "--entity_id",
            "1",
            "--created",
            "2024-05-01",
        ])
        .expect("request") else {
            panic!("expected add request");
        };
        assert!(!dry_run);
        assert_eq!(row.model.table, "integers");
        assert_eq!(row.get("integer"), Some(&FieldValue::Integer(42)));
        assert_eq!(row.get("entity_id"), Some(&FieldValue::Integer(1)));
        assert!(matches!(row.get("created"), Some(FieldValue::DateTime(_))));
        assert!(row.get("updated").is_none());
    }

    #[test]
    fn model_alias_and_password_hashing() {
        let EditorRequest::Add { row, dry_run } = request(&[
            "add",
            "User",
            "--name",
            "test",
            "--password",
            "password1",
            "--email",
            "test@example.com",
            "--dry-run",
        ])
        .expect("request") else {
            panic!("expected add request");
        };
        assert!(dry_run);
        let Some(FieldValue::Text(stored)) = row.get("password") else {
            panic!("password must be text");
        };
        assert!(verify_password("password1", stored).expect("verify"));
    }

    #[test]
    fn invalid_values_fail_while_parsing() {
        let error = request(&["add", "integers", "--integer", "many"]).expect_err("bad int");
        assert!(error.to_string().contains("expects an integer"));
        assert!(request(&["add", "user", "--email", "nobody"]).is_err());
        assert!(request(&["add", "booleans", "--boolean", "maybe"]).is_err());
        assert!(request(&["add", "domain", "--colour", "blue"]).is_err());
    }

    #[test]
    fn edit_requires_row_id() {
        let EditorRequest::Edit { row, id, .. } =
            request(&["edit", "domain", "7", "--url", "example.org"]).expect("request")
        else {
            panic!("expected edit request");
        };
        assert_eq!(id, 7);
        assert_eq!(row.get("url"), Some(&FieldValue::Text("example.org".to_string())));
        assert!(request(&["edit", "domain", "--url", "example.org"]).is_err());
    }

    #[test]
    fn link_requires_both_ids() {
        let EditorRequest::Link {
            association,
            values,
        } = request(&["link", "usergroup", "--user_id", "1", "--group_id", "2"])
            .expect("request")
        else {
            panic!("expected link request");
        };
        assert_eq!(association.table, "usergroup");
        assert_eq!(values, BTreeMap::from([("group_id", 2), ("user_id", 1)]));
        assert!(request(&["link", "usergroup", "--user_id", "1"]).is_err());
    }

    #[test]
    fn bare_editor_command_asks_for_help() {
        assert!(matches!(
            request(&["add"]).expect("request"),
            EditorRequest::Help { command: ADD }
        ));
        assert!(is_editor_command(LINK));
        assert!(!is_editor_command("seed"));
    }
}
