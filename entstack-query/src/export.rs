//! Render a store as a program that rebuilds it
//!
//! The output registers every def, adds every component as a record carrying
//! `@e`, `@d`, `@du` and `@dh`, and leaves the stack empty. Components are
//! matched to defs by content hash on the way back in, so def ids may differ
//! between stores and components of a shadowed def keep their own def.

use entstack_store::{ComponentDef, EntityStore};
use serde_json::Value as Json;
use std::fmt::Write;

/// Program text for the store's defs and components
pub fn export_program(store: &dyn EntityStore) -> String {
    let defs = store.defs();
    let mut out = String::from("@es\n");
    for def in &defs {
        out.push_str(&render_def(def));
        out.push_str(" !d +\n");
    }

    let mut components = store.components().peekable();
    if components.peek().is_some() {
        out.push_str("[\n");
        for component in components {
            let def = defs.iter().find(|d| d.id == component.def);
            let record = component.to_record(def);
            let _ = writeln!(out, "  {}", render(&Json::Object(record)));
        }
        out.push_str("] !c +\n");
    }
    out.push_str("drop\n");

    tracing::debug!(
        "exported {} defs and {} components",
        defs.len(),
        store.component_count()
    );
    out
}

fn render_def(def: &ComponentDef) -> String {
    let props: Vec<String> = def
        .properties
        .iter()
        .map(|p| {
            let mut s = format!("{{\"name\" {} \"type\" \"{}\"", render(&Json::from(p.name.as_str())), p.ty.as_str());
            if let Some(default) = &p.default {
                let _ = write!(s, " \"default\" {}", render(default));
            }
            s.push('}');
            s
        })
        .collect();
    format!("[{} [{}]]", render(&Json::from(def.uri.as_str())), props.join(" "))
}

/// A JSON value as a program literal
fn render(value: &Json) -> String {
    match value {
        Json::Null => "nil".to_string(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.to_string(),
        Json::String(_) => value.to_string(),
        Json::Array(items) => {
            let parts: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", parts.join(" "))
        }
        Json::Object(map) => {
            // reserved markers first so records read naturally
            let mut parts: Vec<String> = Vec::with_capacity(map.len());
            let (reserved, fields): (Vec<_>, Vec<_>) = map.iter().partition(|(k, _)| k.starts_with('@'));
            for (key, value) in reserved.into_iter().chain(fields) {
                parts.push(format!("{} {}", Json::from(key.as_str()), render(value)));
            }
            format!("{{{}}}", parts.join(" "))
        }
    }
}
