//! The query VM
//!
//! A [`QueryStack`] is an arena of frames. Frame 0 is the program's own
//! stack; list and map literals, per-element evaluations (`map`, `filter`,
//! `reduce`, `eval`) and `select` programs each run in a child frame that
//! records its parent by index. Word lookup walks that parent chain before
//! falling back to the built-in dictionary.

use crate::error::{QueryError, Result, Span};
use crate::lexer::{tokenize, SpannedToken, Token};
use crate::select::SelectState;
use crate::value::{ComponentAttr, Kind, Quoted, StackValue, StoreHandle, Value};
use crate::words;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use entstack_store::{BitField, StoreRef};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Result of evaluating a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Skip the rest of the enclosing body
    Escape,
}

/// Signature of built-in and host-supplied words
pub type NativeFn = fn(&mut QueryStack) -> Result<Flow>;

#[derive(Clone)]
pub enum WordBody {
    Native(NativeFn),
    /// Installed by `define`; evaluated on the caller's stack
    Body(Vec<StackValue>),
    /// Installed by `let`; pushed as is
    Value(StackValue),
}

impl fmt::Debug for WordBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WordBody::Native(_) => write!(f, "Native"),
            WordBody::Body(items) => write!(f, "Body({})", StackValue::List(items.clone())),
            WordBody::Value(value) => write!(f, "Value({})", value),
        }
    }
}

/// One overload of a word
///
/// The pattern lists operand kinds bottom to top and is matched against the
/// top of the stack.
#[derive(Debug, Clone)]
pub struct Word {
    pub pattern: Vec<Kind>,
    pub body: WordBody,
}

impl Word {
    pub fn native(pattern: &[Kind], f: NativeFn) -> Self {
        Self {
            pattern: pattern.to_vec(),
            body: WordBody::Native(f),
        }
    }

    pub fn matches(&self, items: &[StackValue]) -> bool {
        if items.len() < self.pattern.len() {
            return false;
        }
        let top = &items[items.len() - self.pattern.len()..];
        self.pattern.iter().zip(top).all(|(kind, value)| kind.matches(value))
    }

    fn describe_pattern(&self) -> String {
        let kinds: Vec<&str> = self.pattern.iter().map(Kind::as_str).collect();
        format!("({})", kinds.join(" "))
    }
}

/// VM limits and lookup policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Iteration ceiling for `loop`
    #[serde(default = "default_loop_limit")]
    pub loop_limit: usize,

    /// Unresolvable def identifiers are errors rather than skipped
    #[serde(default = "default_true")]
    pub strict_defs: bool,

    /// Stack items rendered into error messages
    #[serde(default = "default_snapshot_len")]
    pub snapshot_len: usize,

    /// Nesting ceiling for word bodies and evaluated lists
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_loop_limit() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_snapshot_len() -> usize {
    5
}

fn default_max_depth() -> usize {
    128
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            loop_limit: default_loop_limit(),
            strict_defs: true,
            snapshot_len: default_snapshot_len(),
            max_depth: default_max_depth(),
        }
    }
}

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Pushed onto the stack before the program runs
    pub values: Vec<StackValue>,
    /// Empty the stack and forget user words first
    pub reset: bool,
}

impl QueryOptions {
    pub fn with_values(values: Vec<StackValue>) -> Self {
        Self { values, reset: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Tokens are evaluated
    Eval,
    /// `[ ... ]`: tokens are captured
    List,
    /// `{ ... }`: tokens are captured as key/value pairs
    Map,
}

#[derive(Debug, Clone)]
struct Frame {
    kind: FrameKind,
    items: Vec<StackValue>,
    words: HashMap<String, Vec<Word>>,
    parent: Option<usize>,
    opened_at: Span,
}

impl Frame {
    fn new(kind: FrameKind, parent: Option<usize>, opened_at: Span) -> Self {
        Self {
            kind,
            items: Vec::new(),
            words: HashMap::new(),
            parent,
            opened_at,
        }
    }
}

/// The stack-based query interpreter
pub struct QueryStack {
    frames: Vec<Frame>,
    current: usize,
    store: Option<StoreRef>,
    config: QueryConfig,
    /// Word being dispatched, for diagnostics
    word: String,
    /// Nested `eval_list` calls in progress
    depth: usize,
    pub(crate) selects: Vec<SelectState>,
}

impl QueryStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new(FrameKind::Eval, None, Span::default())],
            current: 0,
            store: None,
            config: QueryConfig::default(),
            word: String::new(),
            depth: 0,
            selects: Vec::new(),
        }
    }

    pub fn with_store(mut self, store: StoreRef) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// The attached store, or `BackendUnavailable`
    pub fn store(&self) -> Result<StoreRef> {
        self.store
            .clone()
            .ok_or_else(|| QueryError::BackendUnavailable(format!("'{}' needs an entity set", self.word)))
    }

    /// Items of the program's own stack, bottom first
    pub fn items(&self) -> &[StackValue] {
        &self.frames[0].items
    }

    pub fn into_items(mut self) -> Vec<StackValue> {
        self.frames.truncate(1);
        self.frames.pop().map(|frame| frame.items).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.frame().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame().items.is_empty()
    }

    pub fn peek(&self) -> Option<&StackValue> {
        self.frame().items.last()
    }

    /// The value `depth` places below the top
    pub fn peek_at(&self, depth: usize) -> Option<&StackValue> {
        let items = &self.frame().items;
        items.len().checked_sub(depth + 1).and_then(|idx| items.get(idx))
    }

    fn frame(&self) -> &Frame {
        &self.frames[self.current]
    }

    fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.current]
    }

    pub fn push(&mut self, value: impl Into<StackValue>) {
        self.frame_mut().items.push(value.into());
    }

    pub fn pop(&mut self) -> Result<StackValue> {
        let word = &self.word;
        self.frames[self.current]
            .items
            .pop()
            .ok_or_else(|| QueryError::StackUnderflow { word: word.clone() })
    }

    /// Pop the top only if it has the given kind
    pub fn pop_if(&mut self, kind: Kind) -> Option<StackValue> {
        if self.peek().map(|v| kind.matches(v)).unwrap_or(false) {
            self.frame_mut().items.pop()
        } else {
            None
        }
    }

    pub fn pop_value(&mut self) -> Result<Value> {
        match self.pop()? {
            StackValue::Value(v) => Ok(v),
            other => Err(self.expected("a value", &other)),
        }
    }

    pub fn pop_list(&mut self) -> Result<Vec<StackValue>> {
        match self.pop()? {
            StackValue::List(items) => Ok(items),
            other => Err(self.expected("a list", &other)),
        }
    }

    pub fn pop_map(&mut self) -> Result<BTreeMap<String, StackValue>> {
        match self.pop()? {
            StackValue::Map(map) => Ok(map),
            other => Err(self.expected("a map", &other)),
        }
    }

    pub fn pop_int(&mut self) -> Result<i64> {
        let value = self.pop()?;
        match value.as_i64() {
            Some(i) => Ok(i),
            None => Err(self.expected("an integer", &value)),
        }
    }

    /// A string or quoted word, as a name
    pub fn pop_name(&mut self) -> Result<String> {
        let value = self.pop()?;
        match value.as_value().and_then(Value::as_name) {
            Some(name) => Ok(name.to_string()),
            None => Err(self.expected("a name", &value)),
        }
    }

    pub fn pop_store(&mut self) -> Result<StoreHandle> {
        match self.pop()? {
            StackValue::EntitySet(handle) => Ok(handle),
            other => Err(self.expected("an entity set", &other)),
        }
    }

    pub fn pop_bitfield(&mut self) -> Result<BitField> {
        match self.pop()? {
            StackValue::BitField(bf) => Ok(bf),
            other => Err(self.expected("a bitfield", &other)),
        }
    }

    pub fn pop_attr(&mut self) -> Result<ComponentAttr> {
        match self.pop()? {
            StackValue::ComponentAttr(attr) => Ok(attr),
            other => Err(self.expected("a component attribute", &other)),
        }
    }

    /// Remove everything from the current frame
    pub fn clear(&mut self) {
        self.frame_mut().items.clear();
    }

    /// Take the whole current frame
    pub fn drain(&mut self) -> Vec<StackValue> {
        std::mem::take(&mut self.frame_mut().items)
    }

    /// Render the top of the stack for diagnostics
    pub fn snapshot(&self) -> String {
        let items = &self.frame().items;
        let start = items.len().saturating_sub(self.config.snapshot_len);
        let parts: Vec<String> = items[start..].iter().map(|v| v.to_string()).collect();
        if start > 0 {
            format!("... {}", parts.join(" "))
        } else {
            parts.join(" ")
        }
    }

    /// `InvalidArguments` for the word being dispatched
    pub fn invalid(&self, message: impl Into<String>) -> QueryError {
        QueryError::InvalidArguments {
            word: self.word.clone(),
            message: message.into(),
            stack: self.snapshot(),
        }
    }

    fn expected(&self, what: &str, got: &StackValue) -> QueryError {
        self.invalid(format!("expected {}, got {}", what, got.kind()))
    }

    pub fn incompatible(&self, left: &StackValue, right: &StackValue) -> QueryError {
        QueryError::IncompatibleTypes {
            word: self.word.clone(),
            left: left.kind().to_string(),
            right: right.kind().to_string(),
        }
    }

    /// Install an overload in the current frame, ahead of existing ones
    pub fn define(&mut self, name: impl Into<String>, word: Word) {
        self.frame_mut().words.entry(name.into()).or_default().insert(0, word);
    }

    /// Install a host-supplied word
    pub fn define_native(&mut self, name: impl Into<String>, pattern: &[Kind], f: NativeFn) {
        self.define(name, Word::native(pattern, f));
    }

    /// Run a program
    pub fn run(&mut self, source: &str) -> Result<()> {
        let tokens = tokenize(source)?;
        self.run_tokens(&tokens)
    }

    /// Run a program after applying per-run options
    pub fn run_with(&mut self, source: &str, options: QueryOptions) -> Result<()> {
        if options.reset {
            self.reset();
        }
        for value in options.values {
            self.push(value);
        }
        self.run(source)
    }

    /// Empty the stack and forget user words
    pub fn reset(&mut self) {
        self.frames.truncate(1);
        self.current = 0;
        self.frames[0].items.clear();
        self.frames[0].words.clear();
        self.depth = 0;
        self.selects.clear();
    }

    pub fn run_tokens(&mut self, tokens: &[SpannedToken]) -> Result<()> {
        let base = self.current;
        let result = self.run_tokens_from(base, tokens);
        if result.is_err() {
            self.frames.truncate(base + 1);
            self.current = base;
        }
        result
    }

    fn run_tokens_from(&mut self, base: usize, tokens: &[SpannedToken]) -> Result<()> {
        for st in tokens {
            match &st.token {
                Token::LBracket => self.open_literal(FrameKind::List, st.span),
                Token::LBrace => self.open_literal(FrameKind::Map, st.span),
                Token::RBracket | Token::RBrace => {
                    let expected = if st.token == Token::RBracket {
                        FrameKind::List
                    } else {
                        FrameKind::Map
                    };
                    if self.current == base || self.frame().kind != expected {
                        return Err(QueryError::UnexpectedClose { span: st.span });
                    }
                    self.close_literal()?;
                }
                token if self.frame().kind == FrameKind::Eval => {
                    tracing::trace!("eval {:?}", token);
                    if self.eval_token(token, st.span)? == Flow::Escape {
                        return Ok(());
                    }
                }
                token => {
                    let value = self.literal(token, st.span)?;
                    self.push(value);
                }
            }
        }

        if self.current != base {
            return Err(QueryError::UnclosedScope {
                span: self.frame().opened_at,
            });
        }
        Ok(())
    }

    fn open_literal(&mut self, kind: FrameKind, span: Span) {
        tracing::debug!("open {:?} scope at {}", kind, span.start);
        self.frames.push(Frame::new(kind, Some(self.current), span));
        self.current = self.frames.len() - 1;
    }

    fn close_literal(&mut self) -> Result<()> {
        let frame = self.pop_frame();
        tracing::debug!("close {:?} scope with {} items", frame.kind, frame.items.len());
        let value = match frame.kind {
            FrameKind::Map => {
                if frame.items.len() % 2 != 0 {
                    return Err(self.literal_error("map literal needs key/value pairs"));
                }
                let mut map = BTreeMap::new();
                let mut items = frame.items.into_iter();
                while let (Some(key), Some(value)) = (items.next(), items.next()) {
                    let key = match key.as_value().and_then(Value::as_name) {
                        Some(name) => name.to_string(),
                        None => {
                            return Err(self.literal_error(format!("map key must be a name, got {}", key)));
                        }
                    };
                    map.insert(key, value);
                }
                StackValue::Map(map)
            }
            _ => StackValue::List(frame.items),
        };
        self.push(value);
        Ok(())
    }

    fn literal_error(&self, message: impl Into<String>) -> QueryError {
        QueryError::InvalidArguments {
            word: "}".to_string(),
            message: message.into(),
            stack: self.snapshot(),
        }
    }

    fn pop_frame(&mut self) -> Frame {
        let frame = match self.frames.pop() {
            Some(frame) => frame,
            None => Frame::new(FrameKind::Eval, None, Span::default()),
        };
        self.current = frame.parent.unwrap_or(0);
        frame
    }

    /// Evaluate `body` in a child frame seeded with `init`; returns what the
    /// child frame holds afterwards. An escape ends the body early.
    pub fn eval_in_child(&mut self, init: Vec<StackValue>, body: &[StackValue]) -> Result<Vec<StackValue>> {
        self.eval_in_child_with(init, HashMap::new(), body)
    }

    pub(crate) fn eval_in_child_with(
        &mut self,
        init: Vec<StackValue>,
        words: HashMap<String, Vec<Word>>,
        body: &[StackValue],
    ) -> Result<Vec<StackValue>> {
        let mut frame = Frame::new(FrameKind::Eval, Some(self.current), Span::default());
        frame.items = init;
        frame.words = words;
        self.frames.push(frame);
        self.current = self.frames.len() - 1;

        let result = self.eval_list(body);
        let frame = self.pop_frame();
        result?;
        Ok(frame.items)
    }

    /// Evaluate captured values in the current frame
    ///
    /// Every nested evaluation passes through here, so this is where
    /// `max_depth` is enforced.
    pub fn eval_list(&mut self, items: &[StackValue]) -> Result<Flow> {
        if self.depth >= self.config.max_depth {
            return Err(QueryError::DepthExceeded {
                limit: self.config.max_depth,
            });
        }
        self.depth += 1;
        let result = self.eval_items(items);
        self.depth -= 1;
        result
    }

    fn eval_items(&mut self, items: &[StackValue]) -> Result<Flow> {
        for item in items {
            if self.eval_value(item.clone())? == Flow::Escape {
                return Ok(Flow::Escape);
            }
        }
        Ok(Flow::Continue)
    }

    pub fn eval_value(&mut self, value: StackValue) -> Result<Flow> {
        match value {
            StackValue::Value(Value::Quoted(quoted)) => self.eval_quoted(quoted),
            other => {
                self.push(other);
                Ok(Flow::Continue)
            }
        }
    }

    fn eval_quoted(&mut self, quoted: Quoted) -> Result<Flow> {
        match quoted {
            Quoted::Word(name) => return self.invoke(&name),
            Quoted::Ref(name) => {
                let value = self.lookup_binding(&name, self.current)?;
                self.push(value);
            }
            Quoted::BackRef(name) => {
                let value = self.back_ref(&name)?;
                self.push(value);
            }
            Quoted::Escaped(1, rest) => self.push(Value::Quoted(Quoted::parse(&rest))),
            Quoted::Escaped(depth, rest) => self.push(Value::Quoted(Quoted::Escaped(depth - 1, rest))),
            Quoted::AttrPath(path) => {
                let attr = self.attr_path(&path)?;
                self.push(attr);
            }
        }
        Ok(Flow::Continue)
    }

    fn eval_token(&mut self, token: &Token, span: Span) -> Result<Flow> {
        match token {
            Token::Word(name) => self.invoke(name),
            Token::Ref(name) => self.eval_quoted(Quoted::Ref(name.clone())),
            Token::BackRef(name) => self.eval_quoted(Quoted::BackRef(name.clone())),
            Token::Escaped(text) => self.eval_quoted(Quoted::parse(text)),
            Token::AttrPath(path) => self.eval_quoted(Quoted::AttrPath(path.clone())),
            other => {
                let value = self.literal(other, span)?;
                self.push(value);
                Ok(Flow::Continue)
            }
        }
    }

    /// The value a token stands for when captured in a literal
    fn literal(&self, token: &Token, span: Span) -> Result<StackValue> {
        let value = match token {
            Token::Int(i) => Value::Int(*i),
            Token::Float(x) => Value::Float(*x),
            Token::Str(s) | Token::Key(s) => Value::Str(s.clone()),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Nil => Value::Nil,
            Token::Word(name) => Value::Quoted(Quoted::Word(name.clone())),
            Token::Ref(name) => Value::Quoted(Quoted::Ref(name.clone())),
            Token::Escaped(text) => Value::Quoted(Quoted::parse(text)),
            Token::AttrPath(path) => Value::Quoted(Quoted::AttrPath(path.clone())),
            Token::BackRef(name) => return self.back_ref(name),
            Token::Regex(source) => {
                let mut builder = RegexBuilder::new(&source.pattern);
                for flag in source.flags.chars() {
                    match flag {
                        'i' => builder.case_insensitive(true),
                        'm' => builder.multi_line(true),
                        's' => builder.dot_matches_new_line(true),
                        'x' => builder.ignore_whitespace(true),
                        'g' | 'u' => &mut builder,
                        other => {
                            return Err(QueryError::Lexer {
                                span,
                                message: format!("unknown regex flag '{}'", other),
                            })
                        }
                    };
                }
                let re = builder.build().map_err(|e| QueryError::Lexer {
                    span,
                    message: e.to_string(),
                })?;
                return Ok(StackValue::Regex(re));
            }
            Token::Date(text) => {
                let dt = if text.trim().is_empty() {
                    Utc::now()
                } else {
                    parse_datetime(text).ok_or_else(|| QueryError::Lexer {
                        span,
                        message: format!("invalid date '{}'", text),
                    })?
                };
                return Ok(StackValue::DateTime(dt));
            }
            Token::Comment | Token::LBracket | Token::RBracket | Token::LBrace | Token::RBrace => {
                return Err(QueryError::UnexpectedClose { span })
            }
        };
        Ok(StackValue::Value(value))
    }

    /// Dispatch a word by name and stack shape
    pub fn invoke(&mut self, name: &str) -> Result<Flow> {
        let word = match self.resolve(name)? {
            Some(word) => word,
            None => {
                self.push(Value::Str(name.to_string()));
                return Ok(Flow::Continue);
            }
        };
        tracing::debug!("dispatch {} {}", name, word.describe_pattern());

        match word.body {
            WordBody::Native(f) => {
                let previous = std::mem::replace(&mut self.word, name.to_string());
                let result = f(self);
                self.word = previous;
                result
            }
            WordBody::Body(items) => {
                self.eval_list(&items)?;
                Ok(Flow::Continue)
            }
            WordBody::Value(value) => {
                self.push(value);
                Ok(Flow::Continue)
            }
        }
    }

    /// First overload matching the current stack; `None` if `name` is no word
    fn resolve(&self, name: &str) -> Result<Option<Word>> {
        let items = &self.frame().items;
        let mut candidates: Vec<&Word> = Vec::new();

        let mut frame = Some(self.current);
        while let Some(idx) = frame {
            if let Some(words) = self.frames[idx].words.get(name) {
                candidates.extend(words.iter());
            }
            frame = self.frames[idx].parent;
        }
        if let Some(words) = words::builtins().get(name) {
            candidates.extend(words.iter());
        }

        if candidates.is_empty() {
            return Ok(None);
        }
        if let Some(word) = candidates.iter().find(|w| w.matches(items)) {
            return Ok(Some((*word).clone()));
        }

        let expected: Vec<String> = candidates.iter().map(|w| w.describe_pattern()).collect();
        Err(QueryError::InvalidArguments {
            word: name.to_string(),
            message: format!("no overload matches; expected one of {}", expected.join(" ")),
            stack: self.snapshot(),
        })
    }

    /// Value bound to `name` by `let` or `define`, searching from `from` outwards
    fn lookup_binding(&self, name: &str, from: usize) -> Result<StackValue> {
        let mut frame = Some(from);
        while let Some(idx) = frame {
            if let Some(words) = self.frames[idx].words.get(name) {
                for word in words {
                    match &word.body {
                        WordBody::Value(value) => return Ok(value.clone()),
                        WordBody::Body(items) => return Ok(StackValue::List(items.clone())),
                        WordBody::Native(_) => {}
                    }
                }
            }
            frame = self.frames[idx].parent;
        }
        Err(QueryError::InvalidArguments {
            word: format!("${}", name),
            message: "no binding with this name".to_string(),
            stack: self.snapshot(),
        })
    }

    /// The frame a back-reference reads from
    fn enclosing_frame(&self) -> usize {
        let frame = self.frame();
        if frame.kind == FrameKind::Eval {
            return frame.parent.unwrap_or(self.current);
        }
        let mut idx = self.current;
        while self.frames[idx].kind != FrameKind::Eval {
            match self.frames[idx].parent {
                Some(parent) => idx = parent,
                None => break,
            }
        }
        idx
    }

    /// `^name` reads a binding, `^N` copies the Nth item from the top
    fn back_ref(&self, name: &str) -> Result<StackValue> {
        let from = self.enclosing_frame();
        match name.parse::<usize>() {
            Ok(depth) => {
                let items = &self.frames[from].items;
                items
                    .len()
                    .checked_sub(depth + 1)
                    .and_then(|idx| items.get(idx))
                    .cloned()
                    .ok_or_else(|| QueryError::StackUnderflow {
                        word: format!("^{}", name),
                    })
            }
            Err(_) => self.lookup_binding(name, from),
        }
    }

    /// Resolve `/uri#pointer` against the attached store
    pub fn attr_path(&self, path: &str) -> Result<StackValue> {
        let (uri, pointer) = path.split_once('#').unwrap_or((path, ""));
        let store = self.store()?;
        let def = store.read().def_by_uri(uri);
        let bitfield = match def {
            Some(def) => BitField::from_ids([def.id]),
            None if self.config.strict_defs => return Err(QueryError::DefNotFound(uri.to_string())),
            None => BitField::new(),
        };
        Ok(StackValue::ComponentAttr(ComponentAttr {
            bitfield,
            pointer: pointer.to_string(),
        }))
    }
}

impl Default for QueryStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryStack")
            .field("items", &self.items())
            .field("frames", &self.frames.len())
            .finish()
    }
}

/// RFC 3339, a bare date, or a naive date-time taken as UTC
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
