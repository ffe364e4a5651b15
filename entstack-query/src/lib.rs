//! # entstack query language
//!
//! A small concatenative language over an entity store. Programs are
//! tokenized with `logos`, then evaluated on a [`QueryStack`]: literals are
//! pushed, words are dispatched by the kinds of the values on top of the
//! stack, and `[ ... ]` / `{ ... }` capture their contents unevaluated.
//!
//! ```
//! use entstack_query::QueryStack;
//!
//! let mut stack = QueryStack::new();
//! stack.run("[1 2 3 4] [10 *] map").unwrap();
//! assert_eq!(stack.items()[0].to_string(), "[10 20 30 40]");
//! ```
//!
//! Store words (`@es`, `!d`, `!c`, `+`, `select`, ...) need a store attached
//! with [`QueryStack::with_store`] or a run through [`StoreQuery::query`].

pub mod error;
pub mod export;
pub mod lexer;
pub mod select;
pub mod stack;
pub mod value;
mod words;

pub use error::{ErrorContext, QueryError, Result, Span};
pub use export::export_program;
pub use lexer::{tokenize, SpannedToken, Token};
pub use select::{CompareOp, Direction, Filter};
pub use stack::{parse_datetime, Flow, NativeFn, QueryConfig, QueryOptions, QueryStack, Word, WordBody};
pub use value::{ComponentAttr, Kind, Quoted, StackValue, StoreHandle, Value};

use entstack_store::StoreRef;

/// Run a program against a store on a fresh stack
pub fn query(store: &StoreRef, source: &str, options: QueryOptions) -> Result<QueryStack> {
    query_with(store, source, options, QueryConfig::default())
}

/// [`query`] with explicit VM settings
pub fn query_with(store: &StoreRef, source: &str, options: QueryOptions, config: QueryConfig) -> Result<QueryStack> {
    let mut stack = QueryStack::new().with_store(store.clone()).with_config(config);
    stack.run_with(source, options)?;
    Ok(stack)
}

/// Query entry point on a shared store handle
pub trait StoreQuery {
    fn query(&self, source: &str, options: QueryOptions) -> Result<QueryStack>;
}

impl StoreQuery for StoreRef {
    fn query(&self, source: &str, options: QueryOptions) -> Result<QueryStack> {
        query(self, source, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entstack_store::{shared, EntitySet};
    use serde_json::json;

    #[test]
    fn test_completed_titles() {
        let store = shared(EntitySet::new());
        let program = r#"
            @es
            ["/component/title" "text"] !d +
            ["/component/completed" [{name: "isComplete" type: "boolean"}]] !d +
            [
                {"@e" 100 "@du" "/component/title" text: "get out of bed"}
                {"@e" 100 "@du" "/component/completed" isComplete: true}
            ] !c +
            [ /component/completed#isComplete true == /component/title !bf @c ] select
        "#;
        let stack = store.query(program, QueryOptions::default()).unwrap();

        let items = stack.into_items();
        assert_eq!(items.len(), 1);
        let StackValue::List(results) = &items[0] else {
            panic!("expected a list");
        };
        assert_eq!(results.len(), 1);
        let StackValue::Component(title) = &results[0] else {
            panic!("expected a component");
        };
        assert_eq!(title.get("text"), Some(&json!("get out of bed")));
    }

    #[test]
    fn test_options_values_are_pushed_first() {
        let store = shared(EntitySet::new());
        let options = QueryOptions::with_values(vec![StackValue::from(2)]);
        let stack = store.query("3 *", options).unwrap();
        assert_eq!(stack.items(), &[StackValue::from(6)]);
    }
}
