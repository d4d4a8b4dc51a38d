//! Naming conventions - collection names and foreign key attributes
//!
//! English-centric pluralization plus the camel/underscore foreign key
//! conventions used when inferring association metadata.

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

/// Foreign key naming conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyConvention {
    /// authorId / tagIds
    #[default]
    CamelCase,
    /// author_id / tag_ids
    Underscore,
}

/// Collection naming conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionNaming {
    /// Plural form (authors, posts)
    #[default]
    Plural,
    /// Same as the model name
    Singular,
}

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
];

const UNCOUNTABLE: &[&str] = &["data", "equipment", "information", "news", "series", "sheep", "species"];

/// Simple pluralization (English-centric)
pub fn pluralize(word: &str) -> String {
    let (head, last) = split_last_segment(word);
    let lower = last.to_lowercase();

    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == lower) {
        return format!("{}{}", head, plural);
    }
    if IRREGULAR.iter().any(|(_, plural)| *plural == lower) {
        return word.to_string();
    }

    let plural = if last.ends_with('y')
        && !["ay", "ey", "iy", "oy", "uy"].iter().any(|s| last.ends_with(s))
    {
        format!("{}ies", &last[..last.len() - 1])
    } else if last.ends_with('s')
        || last.ends_with("sh")
        || last.ends_with("ch")
        || last.ends_with('x')
        || last.ends_with('z')
    {
        format!("{}es", last)
    } else {
        format!("{}s", last)
    };

    format!("{}{}", head, plural)
}

/// Simple singularization (English-centric)
pub fn singularize(word: &str) -> String {
    let (head, last) = split_last_segment(word);
    let lower = last.to_lowercase();

    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((singular, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == lower) {
        return format!("{}{}", head, singular);
    }
    if IRREGULAR.iter().any(|(singular, _)| *singular == lower) {
        return word.to_string();
    }

    let singular = if last.ends_with("ies") && last.len() > 3 {
        format!("{}y", &last[..last.len() - 3])
    } else if last.ends_with("sses")
        || last.ends_with("ches")
        || last.ends_with("shes")
        || last.ends_with("xes")
        || last.ends_with("zes")
    {
        last[..last.len() - 2].to_string()
    } else if last.ends_with("ss") || last.ends_with("us") || last.ends_with("is") {
        last.to_string()
    } else if last.ends_with('s') && last.len() > 1 {
        last[..last.len() - 1].to_string()
    } else {
        last.to_string()
    };

    format!("{}{}", head, singular)
}

/// camelCase a model or association name ("blog-post" -> "blogPost")
pub fn camelize(name: &str) -> String {
    name.to_case(Case::Camel)
}

/// Foreign key attribute for a belongsTo association. The name is used
/// as declared; only hasMany keys are singularized.
pub fn belongs_to_key(association: &str, convention: ForeignKeyConvention) -> String {
    match convention {
        ForeignKeyConvention::CamelCase => format!("{}Id", camelize(association)),
        ForeignKeyConvention::Underscore => format!("{}_id", association.to_case(Case::Snake)),
    }
}

/// Foreign key attribute for a hasMany association
pub fn has_many_key(association: &str, convention: ForeignKeyConvention) -> String {
    let base = singularize(association);
    match convention {
        ForeignKeyConvention::CamelCase => format!("{}Ids", camelize(&base)),
        ForeignKeyConvention::Underscore => format!("{}_ids", base.to_case(Case::Snake)),
    }
}

/// Collection name for a model type
pub fn collection_name(model: &str, naming: CollectionNaming) -> String {
    match naming {
        CollectionNaming::Plural => pluralize(model),
        CollectionNaming::Singular => model.to_string(),
    }
}

// "blog-post" inflects only "post"
fn split_last_segment(word: &str) -> (&str, &str) {
    match word.rfind(|c: char| c == '-' || c == '_') {
        Some(idx) => (&word[..=idx], &word[idx + 1..]),
        None => ("", word),
    }
}
