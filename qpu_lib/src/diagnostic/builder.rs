use qpu_ir::{Target, VarId};
use vec1::Vec1;

use super::{Code, Diagnostic, Span};

impl DiagnosticBuilder {
    pub fn new(span: impl Into<Span>) -> Self {
        Self {
            span: span.into(),
            additional_spans: Vec::new(),
        }
    }

    pub fn with_additional_span(mut self, span: impl Into<Span>, message: Option<String>) -> Self {
        self.add_additional_span(span, message);
        self
    }

    pub fn add_additional_span(&mut self, span: impl Into<Span>, message: Option<String>) {
        self.additional_spans.push((span.into(), message));
    }

    fn build_custom(self, code: Code, message: String) -> Diagnostic {
        Diagnostic {
            code,
            message,
            main_span: (self.span, None),
            additional_spans: self.additional_spans,
        }
    }

    pub fn build_unsupported_on_target(self, what: &str, target: Target) -> Diagnostic {
        let msg = format!("{what} can't be used on {target}");
        self.build_custom(Code::UnsupportedOnTarget, msg)
    }

    pub fn build_invalid_where_body(self, stmt: &str) -> Diagnostic {
        let msg = format!("only assignments are allowed inside `where`, found {stmt}");
        self.build_custom(Code::InvalidWhereBody, msg)
    }

    pub fn build_invalid_assign_target(self, target: &str) -> Diagnostic {
        let msg = format!("can't assign to {target}");
        self.build_custom(Code::InvalidAssignTarget, msg)
    }

    pub fn build_read_of_write_only(self, what: &str) -> Diagnostic {
        let msg = format!("can't read from {what}, it can only be written");
        self.build_custom(Code::ReadOfWriteOnly, msg)
    }

    pub fn build_invalid_rotate(self, amount: i32) -> Diagnostic {
        let msg = format!("rotate amount {amount} is out of range, expected 1 up to 15");
        self.build_custom(Code::InvalidRotate, msg)
    }

    pub fn build_invalid_semaphore(self, id: u8) -> Diagnostic {
        let msg = format!("semaphore {id} does not exist, there are 16 semaphores");
        self.build_custom(Code::InvalidSemaphore, msg)
    }

    pub fn build_live_before_assign(self, vars: &Vec1<VarId>) -> Diagnostic {
        let msg = format!(
            "variables are used before they are assigned: {}",
            var_list(vars)
        );
        self.build_custom(Code::LiveBeforeAssign, msg)
    }

    pub fn build_predicated_live_before_assign(self, vars: &Vec1<VarId>) -> Diagnostic {
        let msg = format!(
            "variables are used before they are assigned, their first assignment is conditional: {}",
            var_list(vars)
        );
        self.build_custom(Code::PredicatedLiveBeforeAssign, msg)
    }

    pub fn build_never_assigned(self, vars: &Vec1<VarId>) -> Diagnostic {
        let msg = format!(
            "variables are used but never assigned: {}",
            var_list(vars)
        );
        self.build_custom(Code::NeverAssigned, msg)
    }

    pub fn build_only_assigned(self, var: VarId) -> Diagnostic {
        let msg = format!("value assigned to v{var} is never used");
        self.build_custom(Code::OnlyAssigned, msg)
    }

    pub fn build_too_many_live(self, var: VarId, live: usize, capacity: usize) -> Diagnostic {
        let msg = format!(
            "{live} variables are live at once, but there are only {capacity} registers; \
             no register left for v{var}"
        );
        self.build_custom(Code::TooManyLiveVariables, msg)
    }

    pub fn build_no_free_register(self, var: VarId) -> Diagnostic {
        let msg = format!("no free register for v{var}");
        self.build_custom(Code::NoFreeRegister, msg)
    }
}

fn var_list(vars: &Vec1<VarId>) -> String {
    vars.iter()
        .map(|var| format!("v{var}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
pub struct DiagnosticBuilder {
    span: Span,
    additional_spans: Vec<(Span, Option<String>)>,
}
