//! Declared data model: every table, column and relationship the store and the
//! editor know about.
//!
//! The metadata here is the single source the editor walks to build its
//! command tree. [`SCHEMA_SQL`] is the matching DDL script; the tests keep the
//! two in lockstep.

use serde::Serialize;

use crate::naming;

pub const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Integer,
    Unicode,
    UnicodeText,
    DateTime,
    Numeric,
    Boolean,
    Password,
    Locale,
    Email,
    Country,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Unicode => "unicode",
            Self::UnicodeText => "unicode_text",
            Self::DateTime => "datetime",
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
            Self::Password => "password",
            Self::Locale => "locale",
            Self::Email => "email",
            Self::Country => "country",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub primary_key: bool,
    pub indexed: bool,
    pub foreign_key: Option<ForeignKey>,
}

impl ColumnDef {
    const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            primary_key: false,
            indexed: false,
            foreign_key: None,
        }
    }

    /// Integer column referencing `<table>.id`.
    const fn references(name: &'static str, table: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Integer,
            primary_key: false,
            indexed: false,
            foreign_key: Some(ForeignKey { table, column: "id" }),
        }
    }

    const fn with_index(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Columns stamped by the store rather than typed by hand.
    pub fn is_timestamp(&self) -> bool {
        matches!(self.name, "created" | "updated")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipKind {
    ManyToOne { via: &'static str },
    OneToMany { remote_column: &'static str },
    ManyToMany { association: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationshipDef {
    pub name: &'static str,
    pub target: &'static str,
    pub kind: RelationshipKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelDef {
    pub name: &'static str,
    pub table: &'static str,
    pub about: &'static str,
    pub columns: &'static [ColumnDef],
    pub relationships: &'static [RelationshipDef],
}

impl ModelDef {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Every column except the primary key.
    pub fn editable_columns(&self) -> impl Iterator<Item = &'static ColumnDef> + use<> {
        self.columns.iter().filter(|column| !column.primary_key)
    }

    pub fn constraint_names(&self) -> Vec<String> {
        table_constraint_names(self.table, self.columns)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssociationDef {
    pub table: &'static str,
    pub about: &'static str,
    pub columns: &'static [ColumnDef],
}

impl AssociationDef {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn constraint_names(&self) -> Vec<String> {
        table_constraint_names(self.table, self.columns)
    }
}

fn table_constraint_names(table: &str, columns: &[ColumnDef]) -> Vec<String> {
    let mut out = Vec::new();
    for column in columns {
        if column.primary_key {
            out.push(naming::primary_key(table));
        }
        if let Some(foreign_key) = column.foreign_key {
            out.push(naming::foreign_key(table, column.name, foreign_key.table));
        }
        if column.indexed {
            out.push(naming::index(table, column.name));
        }
        if column.ty == ColumnType::Boolean {
            out.push(naming::check(table, column.name));
        }
    }
    out
}

const ID: ColumnDef = ColumnDef {
    name: "id",
    ty: ColumnType::Integer,
    primary_key: true,
    indexed: false,
    foreign_key: None,
};
const CREATED: ColumnDef = ColumnDef::new("created", ColumnType::DateTime);
const UPDATED: ColumnDef = ColumnDef::new("updated", ColumnType::DateTime);

const DOMAIN: ModelDef = ModelDef {
    name: "Domain",
    table: "domain",
    about: "A site that entities are served under",
    columns: &[
        ID,
        ColumnDef::new("name", ColumnType::Unicode),
        ColumnDef::new("display_name", ColumnType::Unicode),
        ColumnDef::new("url", ColumnType::Unicode),
        CREATED,
        UPDATED,
    ],
    relationships: &[],
};

const TRANSLATION: ModelDef = ModelDef {
    name: "Translation",
    table: "translation",
    about: "A translation for a particular language",
    columns: &[
        ID,
        ColumnDef::references("translation_id", "translations").with_index(),
        ColumnDef::new("name", ColumnType::Unicode),
        ColumnDef::new("display_name", ColumnType::UnicodeText),
        ColumnDef::new("description", ColumnType::UnicodeText),
        ColumnDef::new("locale", ColumnType::Locale),
        CREATED,
        UPDATED,
    ],
    relationships: &[],
};

const TRANSLATIONS: ModelDef = ModelDef {
    name: "Translations",
    table: "translations",
    about: "A collection of translations of one piece of text",
    columns: &[ID, CREATED, UPDATED],
    relationships: &[RelationshipDef {
        name: "translations",
        target: "Translation",
        kind: RelationshipKind::OneToMany {
            remote_column: "translation_id",
        },
    }],
};

const STRINGS: ModelDef = ModelDef {
    name: "Strings",
    table: "strings",
    about: "Named text value attached to an entity",
    columns: &[
        ID,
        ColumnDef::new("name", ColumnType::Unicode),
        ColumnDef::references("entity_id", "entity").with_index(),
        ColumnDef::new("string", ColumnType::UnicodeText),
        CREATED,
        UPDATED,
    ],
    relationships: &[],
};

const INTEGERS: ModelDef = ModelDef {
    name: "Integers",
    table: "integers",
    about: "Named integer value attached to an entity",
    columns: &[
        ID,
        ColumnDef::new("name", ColumnType::Unicode),
        ColumnDef::references("entity_id", "entity").with_index(),
        ColumnDef::new("integer", ColumnType::Integer),
        CREATED,
        UPDATED,
    ],
    relationships: &[],
};

const FLOATS: ModelDef = ModelDef {
    name: "Floats",
    table: "floats",
    about: "Named numeric value attached to an entity",
    columns: &[
        ID,
        ColumnDef::new("name", ColumnType::Unicode),
        ColumnDef::references("entity_id", "entity").with_index(),
        ColumnDef::new("float", ColumnType::Numeric),
        CREATED,
        UPDATED,
    ],
    relationships: &[],
};

const BOOLEANS: ModelDef = ModelDef {
    name: "Booleans",
    table: "booleans",
    about: "Named boolean value attached to an entity",
    columns: &[
        ID,
        ColumnDef::new("name", ColumnType::Unicode),
        ColumnDef::references("entity_id", "entity").with_index(),
        ColumnDef::new("boolean", ColumnType::Boolean),
        CREATED,
        UPDATED,
    ],
    relationships: &[],
};

const ENTITY: ModelDef = ModelDef {
    name: "Entity",
    table: "entity",
    about: "A routable piece of content",
    columns: &[
        ID,
        ColumnDef::new("name", ColumnType::Unicode),
        ColumnDef::new("route_name", ColumnType::Unicode),
        ColumnDef::references("display_name_id", "translations"),
        ColumnDef::references("domain_id", "domain"),
        CREATED,
        UPDATED,
    ],
    relationships: &[
        RelationshipDef {
            name: "display_name",
            target: "Translations",
            kind: RelationshipKind::ManyToOne {
                via: "display_name_id",
            },
        },
        RelationshipDef {
            name: "domain",
            target: "Domain",
            kind: RelationshipKind::ManyToOne { via: "domain_id" },
        },
        RelationshipDef {
            name: "translations",
            target: "Translations",
            kind: RelationshipKind::ManyToMany {
                association: "entitytranslations",
            },
        },
        RelationshipDef {
            name: "entities",
            target: "Entity",
            kind: RelationshipKind::ManyToMany {
                association: "entityentity",
            },
        },
        RelationshipDef {
            name: "strings",
            target: "Strings",
            kind: RelationshipKind::OneToMany {
                remote_column: "entity_id",
            },
        },
        RelationshipDef {
            name: "booleans",
            target: "Booleans",
            kind: RelationshipKind::OneToMany {
                remote_column: "entity_id",
            },
        },
        RelationshipDef {
            name: "integers",
            target: "Integers",
            kind: RelationshipKind::OneToMany {
                remote_column: "entity_id",
            },
        },
        RelationshipDef {
            name: "floats",
            target: "Floats",
            kind: RelationshipKind::OneToMany {
                remote_column: "entity_id",
            },
        },
    ],
};

const GROUP: ModelDef = ModelDef {
    name: "Group",
    table: "group",
    about: "A named set of users",
    columns: &[
        ID,
        ColumnDef::new("name", ColumnType::Unicode),
        ColumnDef::references("display_name_id", "translations"),
        CREATED,
        UPDATED,
    ],
    relationships: &[
        RelationshipDef {
            name: "display_name",
            target: "Translations",
            kind: RelationshipKind::ManyToOne {
                via: "display_name_id",
            },
        },
        RelationshipDef {
            name: "user",
            target: "User",
            kind: RelationshipKind::ManyToMany {
                association: "usergroup",
            },
        },
    ],
};

const USER: ModelDef = ModelDef {
    name: "User",
    table: "user",
    about: "An account that can sign in",
    columns: &[
        ID,
        ColumnDef::new("name", ColumnType::Unicode),
        ColumnDef::references("display_name_id", "translations"),
        ColumnDef::new("password", ColumnType::Password),
        ColumnDef::new("locale", ColumnType::Locale),
        ColumnDef::new("email", ColumnType::Email),
        ColumnDef::new("country", ColumnType::Country),
        ColumnDef::references("entity_id", "entity"),
        CREATED,
        UPDATED,
    ],
    relationships: &[
        RelationshipDef {
            name: "display_name",
            target: "Translations",
            kind: RelationshipKind::ManyToOne {
                via: "display_name_id",
            },
        },
        RelationshipDef {
            name: "entity",
            target: "Entity",
            kind: RelationshipKind::ManyToOne { via: "entity_id" },
        },
        RelationshipDef {
            name: "group",
            target: "Group",
            kind: RelationshipKind::ManyToMany {
                association: "usergroup",
            },
        },
    ],
};

/// Every mapped model, in table creation order.
pub static MODELS: &[ModelDef] = &[
    DOMAIN,
    TRANSLATIONS,
    TRANSLATION,
    ENTITY,
    STRINGS,
    INTEGERS,
    FLOATS,
    BOOLEANS,
    GROUP,
    USER,
];

pub static ASSOCIATIONS: &[AssociationDef] = &[
    AssociationDef {
        table: "entityentity",
        about: "Links an entity to a related entity",
        columns: &[
            ColumnDef::references("entity_one_id", "entity").with_index(),
            ColumnDef::references("entity_two_id", "entity"),
        ],
    },
    AssociationDef {
        table: "entitytranslations",
        about: "Attaches a translation collection to an entity",
        columns: &[
            ColumnDef::references("entity_id", "entity").with_index(),
            ColumnDef::references("translations_id", "translations"),
        ],
    },
    AssociationDef {
        table: "usergroup",
        about: "Adds a user to a group",
        columns: &[
            ColumnDef::references("user_id", "user").with_index(),
            ColumnDef::references("group_id", "group").with_index(),
        ],
    },
];

/// Case-insensitive lookup by model name (`User`) or table name (`user`).
pub fn find_model(name: &str) -> Option<&'static ModelDef> {
    let name = name.trim();
    MODELS
        .iter()
        .find(|model| model.name.eq_ignore_ascii_case(name) || model.table.eq_ignore_ascii_case(name))
}

pub fn find_association(name: &str) -> Option<&'static AssociationDef> {
    let name = name.trim();
    ASSOCIATIONS
        .iter()
        .find(|association| association.table.eq_ignore_ascii_case(name))
}
