use crate::{
    cfg::Cfg,
    dfa::{liveness::Liveness, uda::UseDef, VarSet},
    Instruction, VarId,
};

/// The interference relation between variables: two variables interfere if they can't share
/// a register.
#[derive(Debug, Clone, Default)]
pub struct ConflictGraph {
    neighbours: Vec<VarSet>,
}

impl ConflictGraph {
    /// Variables interfere if they are live-in at the same instruction, or if one is defined
    /// while the other is live-out.
    pub fn build(
        instrs: &[Instruction],
        cfg: &Cfg,
        liveness: &Liveness,
        num_vars: usize,
    ) -> Self {
        let mut graph = Self {
            neighbours: vec![VarSet::new(); num_vars],
        };

        for (i, instr) in instrs.iter().enumerate() {
            let live: Vec<VarId> = liveness.live_in(i).iter().collect();
            for (j, &a) in live.iter().enumerate() {
                for &b in &live[j + 1..] {
                    graph.add_edge(a, b);
                }
            }

            if let Some(def) = UseDef::vars_of(instr, false).def {
                for other in liveness.live_out(i, cfg).iter() {
                    if other != def {
                        graph.add_edge(def, other);
                    }
                }
            }
        }

        graph
    }

    fn add_edge(&mut self, a: VarId, b: VarId) {
        let len = a.max(b) as usize + 1;
        if self.neighbours.len() < len {
            self.neighbours.resize_with(len, VarSet::new);
        }
        self.neighbours[a as usize].insert(b);
        self.neighbours[b as usize].insert(a);
    }

    pub fn neighbours(&self, var: VarId) -> impl Iterator<Item = VarId> + '_ {
        self.neighbours
            .get(var as usize)
            .into_iter()
            .flat_map(|set| set.iter())
    }

    pub fn interferes(&self, a: VarId, b: VarId) -> bool {
        self.neighbours
            .get(a as usize)
            .map_or(false, |set| set.contains(b))
    }
}
