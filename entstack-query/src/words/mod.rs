//! Built-in words
//!
//! Each submodule registers its overloads into one dictionary. Overloads of
//! a name are tried in registration order; put specific patterns first.

mod control;
mod list;
mod math;
mod stack;
mod store;

use crate::stack::{NativeFn, Word};
use crate::value::Kind;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub(crate) use math::{compare_values, values_equal};

/// Name to overloads
#[derive(Default)]
pub struct Dictionary {
    words: HashMap<String, Vec<Word>>,
}

impl Dictionary {
    pub fn add(&mut self, name: &str, pattern: &[Kind], f: NativeFn) -> &mut Self {
        self.words
            .entry(name.to_string())
            .or_default()
            .push(Word::native(pattern, f));
        self
    }

    pub fn into_words(self) -> HashMap<String, Vec<Word>> {
        self.words
    }
}

static BUILTINS: Lazy<HashMap<String, Vec<Word>>> = Lazy::new(|| {
    let mut dict = Dictionary::default();
    stack::register(&mut dict);
    math::register(&mut dict);
    list::register(&mut dict);
    control::register(&mut dict);
    store::register(&mut dict);
    dict.into_words()
});

pub(crate) fn builtins() -> &'static HashMap<String, Vec<Word>> {
    &BUILTINS
}
