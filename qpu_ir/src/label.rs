use std::rc::Rc;

/// A branch target. Labels only exist until finalization, which turns every branch to a label
/// into a relative branch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(Rc<str>);

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self(Rc::from(value))
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self(Rc::from(value))
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)?;
        // the alternate form is the one used for label definitions in listings
        if f.alternate() {
            f.write_str(":")?;
        }
        Ok(())
    }
}
