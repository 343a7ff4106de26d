/// Switch instruction selection (javac-style)
/// Chooses between tableswitch and lookupswitch based on case density

#[derive(Debug, Clone)]
pub struct SwitchOptimizer<L> {
    cases: Vec<(i32, L)>,
    default: L,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchInstruction<L> {
    TableSwitch { low: i32, high: i32, default: L, targets: Vec<L> },
    LookupSwitch { default: L, pairs: Vec<(i32, L)> },
}

impl<L: Copy> SwitchOptimizer<L> {
    pub fn new(default: L) -> Self {
        Self { cases: Vec::new(), default }
    }

    pub fn add_case(&mut self, value: i32, target: L) {
        self.cases.push((value, target));
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// javac's space/time cost comparison
    pub fn optimize(&self) -> SwitchInstruction<L> {
        let mut sorted = self.cases.clone();
        sorted.sort_by_key(|(value, _)| *value);
        sorted.dedup_by_key(|(value, _)| *value);

        let (lo, hi) = match (sorted.first(), sorted.last()) {
            (Some(first), Some(last)) => (first.0, last.0),
            _ => return SwitchInstruction::LookupSwitch { default: self.default, pairs: Vec::new() },
        };
        let nlabels = sorted.len() as i64;
        let table_space_cost = 4 + (hi as i64 - lo as i64 + 1);
        let table_time_cost = 3;
        let lookup_space_cost = 3 + 2 * nlabels;
        let lookup_time_cost = nlabels;
        let use_table = table_space_cost + 3 * table_time_cost <= lookup_space_cost + 3 * lookup_time_cost;

        if use_table {
            let mut targets = vec![self.default; (hi as i64 - lo as i64 + 1) as usize];
            for (value, target) in &sorted {
                targets[(*value as i64 - lo as i64) as usize] = *target;
            }
            SwitchInstruction::TableSwitch { low: lo, high: hi, default: self.default, targets }
        } else {
            SwitchInstruction::LookupSwitch { default: self.default, pairs: sorted }
        }
    }
}
