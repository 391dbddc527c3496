use std::any::type_name;

use documented::{Documented, DocumentedFields};
use toml_edit::{Decor, DocumentMut, Item, RawString, Table};
use tracing::debug;

use crate::error::{ConfigError, Result};

fn toml_comments(text: &str) -> String {
    text.lines()
        .map(|l| {
            if l.is_empty() {
                "#\n".into()
            } else {
                format!("# {l}\n")
            }
        })
        .collect()
}

/// Turns `docs` into `#` comment lines and appends them to the prefix of `decor`.
///
/// A blank `#` line separates the new block from an existing comment.
pub fn append_docs_as_toml_comments(decor: &mut Decor, docs: &str) {
    let comments = toml_comments(docs);

    let old_prefix = decor
        .prefix()
        .and_then(RawString::as_str)
        .unwrap_or_default();

    let new_prefix = if old_prefix.is_empty() || old_prefix.ends_with("\n\n") {
        format!("{old_prefix}{comments}")
    } else if old_prefix.ends_with('\n') {
        format!("{old_prefix}#\n{comments}")
    } else {
        format!("{old_prefix}\n{comments}")
    };
    decor.set_prefix(new_prefix);
}

/// Appends every key of `examples` missing from `doc` as a commented-out entry under its docs.
///
/// Entries go after everything else, so table examples such as `[headers]` stay valid when
/// uncommented.
pub fn append_commented_fields<T>(doc: &mut DocumentMut, examples: &[(&str, &str)])
where
    T: DocumentedFields,
{
    let mut trailing = doc
        .trailing()
        .as_str()
        .unwrap_or_default()
        .to_string();

    for &(name, example) in examples {
        if doc.contains_key(name) {
            continue;
        }
        let Ok(docs) = T::get_field_docs(name) else {
            debug!(
                "No documentation for key `{}` on `{}`",
                name,
                type_name::<T>()
            );
            continue;
        };

        trailing.push('\n');
        trailing.push_str(&toml_comments(docs));
        trailing.push_str(&toml_comments(example));
    }

    doc.set_trailing(trailing);
}

/// Writes the field docs of `T` above each matching key in `table`.
///
/// Nested tables get the docs of the field that holds them. Keys without docs on `T` are
/// left alone.
pub fn annotate_toml_table<T>(table: &mut Table) -> Result<()>
where
    T: Documented + DocumentedFields,
{
    for (mut key, item) in table.iter_mut() {
        let name = key.get().to_string();
        let Ok(docs) = T::get_field_docs(&name) else {
            debug!(
                "No documentation for key `{}` on `{}`",
                name,
                type_name::<T>()
            );
            continue;
        };

        match item {
            Item::None => return Err(ConfigError::UnexpectedTomlItem(name)),
            Item::Value(_) => append_docs_as_toml_comments(key.leaf_decor_mut(), docs),
            Item::Table(sub_table) => append_docs_as_toml_comments(sub_table.decor_mut(), docs),
            Item::ArrayOfTables(array) => {
                if let Some(first) = array.iter_mut().next() {
                    append_docs_as_toml_comments(first.decor_mut(), docs);
                }
            }
        }
    }

    Ok(())
}

/// Parses `toml` and annotates it with the docs of `T`, with the type-level docs as a header.
pub fn annotated_document<T>(toml: &str) -> Result<DocumentMut>
where
    T: Documented + DocumentedFields,
{
    let mut doc = toml.parse::<DocumentMut>()?;
    annotate_toml_table::<T>(doc.as_table_mut())?;

    let mut header = Decor::new("", "");
    append_docs_as_toml_comments(&mut header, T::DOCS);
    let header = header
        .prefix()
        .and_then(RawString::as_str)
        .unwrap_or_default();

    Ok(format!("{header}\n{doc}").parse::<DocumentMut>()?)
}
