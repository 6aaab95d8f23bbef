//! String-to-categorical transforms.

use std::collections::HashMap;

/// Ordering of codes for observed categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryOrder {
    /// First occurrence gets the lowest code.
    Encounter,
    /// Codes follow the lexical order of the labels.
    Lexical,
}

/// Encode values over the set of distinct observed labels.
///
/// Returns the codes (missing values stay missing) and the label per code.
pub fn encode_observed(
    values: &[Option<String>],
    order: CategoryOrder,
) -> (Vec<Option<u32>>, Vec<String>) {
    let mut labels: Vec<String> = Vec::new();
    let mut index: HashMap<&str, u32> = HashMap::new();

    for value in values.iter().flatten() {
        if !index.contains_key(value.as_str()) {
            index.insert(value.as_str(), labels.len() as u32);
            labels.push(value.clone());
        }
    }

    if order == CategoryOrder::Lexical {
        labels.sort();
        index = labels
            .iter()
            .enumerate()
            .map(|(code, label)| (label.as_str(), code as u32))
            .collect();
    }

    let codes = values
        .iter()
        .map(|v| v.as_deref().and_then(|s| index.get(s).copied()))
        .collect();

    (codes, labels)
}

/// Encode values against a declared category list.
///
/// Duplicate declared labels keep their first position. Returns the first
/// observed value missing from the declaration as the error.
pub fn encode_declared(
    values: &[Option<String>],
    declared: &[String],
) -> Result<(Vec<Option<u32>>, Vec<String>), String> {
    let mut labels: Vec<String> = Vec::with_capacity(declared.len());
    let mut index: HashMap<&str, u32> = HashMap::new();
    for label in declared {
        if !index.contains_key(label.as_str()) {
            index.insert(label.as_str(), labels.len() as u32);
            labels.push(label.clone());
        }
    }

    let mut codes = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Some(v) => match index.get(v.as_str()) {
                Some(&code) => codes.push(Some(code)),
                None => return Err(v.clone()),
            },
            None => codes.push(None),
        }
    }

    Ok((codes, labels))
}
