//! Exhaustive workflow validation.
//!
//! Validation never stops at the first problem: every check runs and every
//! issue is collected so authoring tools can show the whole list. Issues
//! carry a stable `code` for programmatic handling.

use crate::definition::Workflow;
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable issue codes.
pub mod codes {
    pub const NO_NODES: &str = "no_nodes";
    pub const NO_TRIGGER: &str = "no_trigger";
    pub const CYCLE: &str = "cycle";
    pub const ORPHAN_NODE: &str = "orphan_node";
    pub const UNKNOWN_TRIGGER_NODE: &str = "unknown_trigger_node";
    pub const TRIGGER_NOT_TRIGGER_NODE: &str = "trigger_not_trigger_node";
    pub const UNAVAILABLE_TYPE: &str = "unavailable_type";
}

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The workflow cannot be published or run.
    Error,
    /// The workflow is usable but probably not what the author meant.
    Warning,
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{severity}[{}]: {}", self.code, self.message)
    }
}

/// The outcome of validating a workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// True when no error-severity issue was found.
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: !issues.iter().any(|i| i.severity == Severity::Error),
            issues,
        }
    }

    /// Error-severity issues.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Warning-severity issues.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    /// Returns true if any issue has the given code.
    #[must_use]
    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

struct Collector(Vec<ValidationIssue>);

impl Collector {
    fn push(
        &mut self,
        severity: Severity,
        code: &str,
        message: String,
        node_id: Option<&NodeId>,
    ) {
        self.0.push(ValidationIssue {
            severity,
            code: code.to_string(),
            message,
            node_id: node_id.cloned(),
        });
    }
}

/// Validates the workflow's structure.
#[must_use]
pub fn validate(workflow: &Workflow) -> ValidationReport {
    let mut issues = Collector(Vec::new());
    structural_checks(workflow, &mut issues);
    ValidationReport::from_issues(issues.0)
}

/// Validates structure and that every node type has an available adapter.
#[must_use]
pub fn validate_with_types(
    workflow: &Workflow,
    is_available: impl Fn(&str) -> bool,
) -> ValidationReport {
    let mut issues = Collector(Vec::new());
    structural_checks(workflow, &mut issues);
    for node in workflow.graph().nodes() {
        if !is_available(&node.node_type) {
            issues.push(
                Severity::Error,
                codes::UNAVAILABLE_TYPE,
                format!(
                    "node '{}' has type '{}' which no adapter provides",
                    node.id, node.node_type
                ),
                Some(&node.id),
            );
        }
    }
    ValidationReport::from_issues(issues.0)
}

fn structural_checks(workflow: &Workflow, issues: &mut Collector) {
    let graph = workflow.graph();

    if graph.node_count() == 0 {
        issues.push(
            Severity::Error,
            codes::NO_NODES,
            "workflow must have at least one node".to_string(),
            None,
        );
    }

    if !graph.nodes().any(|node| node.is_trigger()) {
        issues.push(
            Severity::Error,
            codes::NO_TRIGGER,
            "workflow must have at least one trigger node".to_string(),
            None,
        );
    }

    if let Err(report) = graph.topological_order() {
        issues.push(Severity::Error, codes::CYCLE, report.to_string(), None);
    }

    for trigger in workflow.triggers() {
        match graph.get_node(trigger.node_id.as_str()) {
            None => issues.push(
                Severity::Error,
                codes::UNKNOWN_TRIGGER_NODE,
                format!("trigger {} points at unknown node '{}'", trigger.id, trigger.node_id),
                Some(&trigger.node_id),
            ),
            Some(node) if !node.is_trigger() => issues.push(
                Severity::Error,
                codes::TRIGGER_NOT_TRIGGER_NODE,
                format!(
                    "trigger {} points at node '{}' which is a {} node",
                    trigger.id, node.id, node.category
                ),
                Some(&node.id),
            ),
            Some(_) => {}
        }
    }

    for node in graph.nodes() {
        if node.is_trigger() {
            continue;
        }
        // Without an inbound edge a non-trigger node would run as a root.
        let id = node.id.as_str();
        if !graph.predecessors(id).is_empty() {
            continue;
        }
        let message = if graph.successors(id).is_empty() {
            format!("node '{id}' is not connected to any other node")
        } else {
            format!("node '{id}' has no incoming edge and is not a trigger")
        };
        issues.push(Severity::Warning, codes::ORPHAN_NODE, message, Some(&node.id));
    }
}
