use serde::Serialize;

/// Number of faults injected, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChaosTotals {
    pub deletes: u32,
    pub updates: u32,
    pub expirations: u32,
    pub reconnects: u32,
    pub suspensions: u32,
}

impl ChaosTotals {
    pub fn total(&self) -> u32 {
        self.deletes + self.updates + self.expirations + self.reconnects + self.suspensions
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

impl Check {
    pub fn new(name: &str, passed: bool, details: impl Into<String>) -> Self {
        Self {
            name: name.to_owned(),
            passed,
            details: details.into(),
        }
    }
}

/// State of one managed node at the end of the chaos phase.
#[derive(Debug, Clone, Serialize)]
pub struct NodeResult {
    pub base_path: String,
    pub mode: String,
    pub actual_path: Option<String>,
    pub auth_failure: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SoakReport {
    pub passed: bool,
    pub seed: u64,
    pub rounds_planned: u32,
    pub rounds_completed: u32,
    pub cancelled: bool,
    pub duration_ms: u128,
    pub slowest_heal_ms: u128,
    pub chaos: ChaosTotals,
    pub nodes: Vec<NodeResult>,
    pub checks: Vec<Check>,
}

impl SoakReport {
    pub fn human_summary(&self) -> String {
        let mut output = String::new();
        output.push_str("znode soak report\n");
        output.push_str(&format!(
            "status: {}\n",
            if self.passed { "PASS" } else { "FAIL" }
        ));
        output.push_str(&format!(
            "rounds: planned={}, completed={}{} (seed {})\n",
            self.rounds_planned,
            self.rounds_completed,
            if self.cancelled { ", cancelled" } else { "" },
            self.seed
        ));
        output.push_str(&format!(
            "chaos: total={}, deletes={}, updates={}, expirations={}, reconnects={}, suspensions={}\n",
            self.chaos.total(),
            self.chaos.deletes,
            self.chaos.updates,
            self.chaos.expirations,
            self.chaos.reconnects,
            self.chaos.suspensions
        ));
        output.push_str(&format!(
            "timing: duration={}ms slowest_heal={}ms\n",
            self.duration_ms, self.slowest_heal_ms
        ));
        for node in &self.nodes {
            output.push_str(&format!(
                "node {} ({}): {}{}\n",
                node.base_path,
                node.mode,
                node.actual_path.as_deref().unwrap_or("<never created>"),
                if node.auth_failure { " [auth failure]" } else { "" }
            ));
        }
        for check in &self.checks {
            output.push_str(&format!(
                "check [{}] {}: {}\n",
                if check.passed { "PASS" } else { "FAIL" },
                check.name,
                check.details
            ));
        }
        output
    }
}
