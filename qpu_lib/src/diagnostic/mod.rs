//! Compile diagnostics.
//!
//! There is no source text for kernels: they are built as trees in the host program. Diagnostics
//! therefore point at instructions of the target listing, a [`Span`] is a range of instruction
//! indices.

pub mod builder;

use std::{
    collections::LinkedList,
    fmt::{Debug, Display},
};

pub use builder::DiagnosticBuilder;

use qpu_ir::InstrId;

/// A range of instructions.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    start: InstrId,
    length: usize,
}

impl From<std::ops::Range<InstrId>> for Span {
    fn from(value: std::ops::Range<InstrId>) -> Self {
        Self {
            start: value.start,
            length: value.len(),
        }
    }
}

impl From<InstrId> for Span {
    /// The span of a single instruction.
    fn from(value: InstrId) -> Self {
        Self {
            start: value,
            length: 1,
        }
    }
}

impl From<Span> for std::ops::Range<InstrId> {
    fn from(val: Span) -> Self {
        val.start..val.excl_end()
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.excl_end())
    }
}

impl Span {
    pub fn start(&self) -> InstrId {
        self.start
    }

    pub fn excl_end(&self) -> InstrId {
        self.start + self.length
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

// WARNING: Don't change the order of these (Error codes will change)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// This is an internal code that should never be used for actual diagnostics.
    Unspecified = 0,
    UnsupportedOnTarget,
    InvalidWhereBody,
    InvalidAssignTarget,
    ReadOfWriteOnly,
    InvalidRotate,
    InvalidSemaphore,
    LiveBeforeAssign,
    PredicatedLiveBeforeAssign,
    NeverAssigned,
    OnlyAssigned,
    TooManyLiveVariables,
    NoFreeRegister,
}

impl Code {
    /// Get a unique numeric code for this `Code`
    fn as_code(&self) -> u32 {
        *self as u32
    }

    /// Returns `true` for the codes that are reported as recoverable, and so can be upgraded to
    /// errors.
    pub fn is_warning(&self) -> bool {
        matches!(self, Code::OnlyAssigned)
    }
}

impl Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:0>4x}", self.as_code())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    code: Code,
    message: String,
    main_span: (Span, Option<String>),
    additional_spans: Vec<(Span, Option<String>)>,
}

impl Diagnostic {
    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn message(&self) -> &String {
        &self.message
    }

    pub fn main_span(&self) -> &Span {
        &self.main_span.0
    }

    pub fn main_span_message(&self) -> Option<&String> {
        self.main_span.1.as_ref()
    }

    pub fn additional_spans(&self) -> impl Iterator<Item = (&Span, Option<&String>)> {
        self.additional_spans.iter().map(|(s, m)| (s, m.as_ref()))
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} (at {:?})", self.code, self.message, self.main_span.0)
    }
}

/// Specifies the possibles types of diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// For recoverable diagnostics. (cfr. warnings)
    Rec,
    /// For non-recoverable diagnostics. (cfr. errors)
    Err,
}

/// A result combining a value with aggregated diagnostics.
///
/// Can be in one of three states:
/// - _ok_: The result contains a value and has no diagnostics. Corresponds to `Result::Ok`.
/// - _rec_: recoverable: The result contains a (recovered) value and has only diagnostics of the
///   kind [`DiagnosticKind::Rec`].
/// - _err_: non-recoverable: The result does not contain a value and has at least one diagnostic of
///   the kind [`DiagnosticKind::Err`].
///
/// It is guaranteed that the result will never be completely empty (i.e. no value nor diagnostics).
///
/// Compile stages collect every problem they find before failing, so one compile reports all of
/// them at once.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult<T> {
    value: Option<T>,
    diagnostics: LinkedList<(DiagnosticKind, Diagnostic)>,
}

impl<T> AggregateResult<T> {
    /// Creates an `AggregateResult` in an _ok_ state containing the specified value.
    ///
    /// # Examples
    ///
    /// ```
    /// # use qpu_lib::diagnostic::*;
    /// let res = AggregateResult::new_ok(2);
    ///
    /// assert!(res.is_ok());
    /// assert_eq!(res.value(), Some(&2));
    /// assert!(res.diagnostics().next().is_none());
    /// ```
    pub fn new_ok(value: T) -> Self {
        Self {
            value: Some(value),
            diagnostics: LinkedList::new(),
        }
    }

    /// Creates an `AggregateResult` in a _rec_ state containing the specified value and diagnostic.
    ///
    /// The diagnostic will be given the kind [`DiagnosticKind::Rec`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use qpu_lib::diagnostic::*;
    /// let diagnostic = DiagnosticBuilder::new(4).build_only_assigned(2);
    /// let res = AggregateResult::new_rec("kernel", diagnostic.clone());
    ///
    /// assert!(res.is_rec());
    /// assert_eq!(res.value(), Some(&"kernel"));
    /// let mut diags = res.diagnostics();
    /// assert_eq!(diags.next(), Some((DiagnosticKind::Rec, &diagnostic)));
    /// assert!(diags.next().is_none());
    /// ```
    pub fn new_rec(value: T, diagnostic: Diagnostic) -> Self {
        Self {
            value: Some(value),
            diagnostics: LinkedList::from([(DiagnosticKind::Rec, diagnostic)]),
        }
    }

    /// Creates an `AggregateResult` in an _err_ state containing the specified diagnostic.
    ///
    /// The diagnostic will be given the kind [`DiagnosticKind::Err`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use qpu_lib::diagnostic::*;
    /// let diagnostic = DiagnosticBuilder::new(0).build_invalid_semaphore(16);
    /// let res = AggregateResult::<()>::new_err(diagnostic.clone());
    ///
    /// assert!(res.is_err());
    /// assert!(res.value().is_none());
    /// let mut diags = res.diagnostics();
    /// assert_eq!(diags.next(), Some((DiagnosticKind::Err, &diagnostic)));
    /// assert!(diags.next().is_none());
    /// ```
    pub fn new_err(diagnostic: Diagnostic) -> Self {
        Self {
            value: None,
            diagnostics: LinkedList::from([(DiagnosticKind::Err, diagnostic)]),
        }
    }

    /// Returns `true` if the result is in an _ok_ state.
    pub fn is_ok(&self) -> bool {
        self.value.is_some() && self.diagnostics.is_empty()
    }

    /// Returns `true` if the result is in a _rec_ state.
    pub fn is_rec(&self) -> bool {
        self.value.is_some() && !self.diagnostics.is_empty()
    }

    /// Returns `true` if the result is in an _err_ state.
    pub fn is_err(&self) -> bool {
        self.value.is_none()
    }

    /// Returns the contained value for _ok_ and _rec_ results.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Returns an iterator over the diagnostics for _rec_ and _err_ results.
    pub fn diagnostics(&self) -> impl Iterator<Item = (DiagnosticKind, &Diagnostic)> {
        self.diagnostics.iter().map(|(dt, d)| (*dt, d))
    }

    pub fn into_diagnostics(self) -> impl Iterator<Item = (DiagnosticKind, Diagnostic)> {
        self.diagnostics.into_iter()
    }

    /// Adds a recoverable diagnostic to the result.
    ///
    /// An _ok_ result will become a _rec_ result.
    pub fn add_rec_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics
            .push_back((DiagnosticKind::Rec, diagnostic));
    }

    /// Adds a non-recoverable diagnostic to the result.
    ///
    /// The result will become an _err_ result, dropping a contained value.
    pub fn add_err(&mut self, diagnostic: Diagnostic) {
        self.value = None;
        self.diagnostics
            .push_back((DiagnosticKind::Err, diagnostic));
    }

    /// Runs the predicate for all recoverable diagnostics, turning the diagnostics where the
    /// predicate returns `true` into an error. This will also make the `AggregateResult` itself
    /// an _err_.
    ///
    /// # Examples
    ///
    /// ```
    /// # use qpu_lib::diagnostic::*;
    /// let warning = DiagnosticBuilder::new(3).build_only_assigned(7);
    /// let mut res = AggregateResult::new_rec((), warning);
    /// res.upgrade_diagnostics(|d| *d.code() == Code::OnlyAssigned);
    ///
    /// assert!(res.is_err());
    /// assert_eq!(res.diagnostics().next().map(|d| d.0), Some(DiagnosticKind::Err));
    /// ```
    pub fn upgrade_diagnostics<F>(&mut self, mut predicate: F)
    where
        F: FnMut(&Diagnostic) -> bool,
    {
        for (kind, diagnostic) in &mut self.diagnostics {
            if *kind == DiagnosticKind::Err {
                continue;
            }
            if predicate(diagnostic) {
                *kind = DiagnosticKind::Err;
                self.value = None;
            }
        }
    }

    /// Maps an `AggregateResult<T>` to `AggregateResult<U>` by applying a function to a
    /// contained value, leaving diagnostics untouched.
    #[must_use]
    pub fn map<U, F>(self, op: F) -> AggregateResult<U>
    where
        F: FnOnce(T) -> U,
    {
        AggregateResult {
            value: self.value.map(op),
            diagnostics: self.diagnostics,
        }
    }

    /// Calls `op` if the result has a value, aggregating the diagnostics of `self` with the result
    /// returned by `op`.
    #[must_use]
    pub fn and_then<U, F>(mut self, op: F) -> AggregateResult<U>
    where
        F: FnOnce(T) -> AggregateResult<U>,
    {
        match self.value {
            Some(t) => {
                let mut other = op(t);
                self.diagnostics.append(&mut other.diagnostics);
                other.diagnostics = self.diagnostics;
                other
            }
            None => AggregateResult {
                value: None,
                diagnostics: self.diagnostics,
            },
        }
    }

    /// Add `self` to `other`, combining their values using `f`, and aggregating their diagnostics.
    ///
    /// `other` becomes an _err_ result if `self` is one.
    pub fn add_to<U, F>(mut self, other: &mut AggregateResult<U>, f: F)
    where
        F: FnOnce(&mut U, T),
    {
        if let Some((u, t)) = other.value.as_mut().zip(self.value) {
            f(u, t);
        } else {
            other.value = None;
        }
        other.diagnostics.append(&mut self.diagnostics);
    }
}
