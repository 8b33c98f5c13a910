use crate::VarId;

/// A set of variables.
///
/// The ids are kept sorted, which makes set equality a plain comparison and keeps the
/// iteration order stable for dumps.
///
/// ```
/// use qpu_ir::dfa::VarSet;
///
/// let mut set = VarSet::new();
/// assert!(set.insert(3));
/// assert!(set.insert(1));
/// assert!(!set.insert(3));
///
/// assert!(set.contains(1));
/// assert_eq!(vec![1, 3], set.iter().collect::<Vec<_>>());
///
/// let mut other = VarSet::from_iter([2, 3]);
/// assert!(other.union_with(&set));
/// assert_eq!(3, other.len());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VarSet {
    vars: Vec<VarId>,
}

impl VarSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `var` to the set, returns `true` if it was not yet present.
    pub fn insert(&mut self, var: VarId) -> bool {
        match self.vars.binary_search(&var) {
            Ok(_) => false,
            Err(pos) => {
                self.vars.insert(pos, var);
                true
            }
        }
    }

    /// Removes `var` from the set, returns `true` if it was present.
    pub fn remove(&mut self, var: VarId) -> bool {
        match self.vars.binary_search(&var) {
            Ok(pos) => {
                self.vars.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, var: VarId) -> bool {
        self.vars.binary_search(&var).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = VarId> + '_ {
        self.vars.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Adds all elements of `other`, returns `true` if the set changed.
    pub fn union_with(&mut self, other: &VarSet) -> bool {
        if other.vars.iter().all(|var| self.contains(*var)) {
            return false;
        }
        let (a, b) = (&self.vars, &other.vars);
        let mut merged = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(a[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(b[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&a[i..]);
        merged.extend_from_slice(&b[j..]);
        self.vars = merged;
        true
    }
}

impl FromIterator<VarId> for VarSet {
    fn from_iter<T: IntoIterator<Item = VarId>>(iter: T) -> Self {
        let mut vars: Vec<_> = iter.into_iter().collect();
        vars.sort_unstable();
        vars.dedup();
        Self { vars }
    }
}

impl std::fmt::Display for VarSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, var) in self.vars.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "v{var}")?;
        }
        f.write_str("}")
    }
}
