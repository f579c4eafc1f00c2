use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Inactive,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Active => "active",
            WorkflowStatus::Inactive => "inactive",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(WorkflowStatus::Draft),
            "active" => Ok(WorkflowStatus::Active),
            "inactive" => Ok(WorkflowStatus::Inactive),
            _ => Err(format!("unknown workflow status: {s}")),
        }
    }
}

/// Remediation workflow definition. Only `active` workflows may be executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub definition: Value,
    pub schedule: Option<String>,
    pub status: WorkflowStatus,
    pub version: i32,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Structured form of a workflow `definition` with a step list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub config: Value,
}

impl Workflow {
    pub fn can_execute(&self) -> bool {
        self.status == WorkflowStatus::Active
    }

    /// Parses the definition JSON. An empty definition parses to zero steps.
    pub fn parse_definition(&self) -> Result<WorkflowDefinition, Error> {
        if self.definition.is_null() {
            return Ok(WorkflowDefinition::default());
        }
        serde_json::from_value(self.definition.clone())
            .map_err(|e| Error::Validation(format!("invalid workflow definition: {e}")))
    }

    /// Whether the definition carries a non-empty step list, i.e. the
    /// engine should run it through the dynamic entrypoint.
    pub fn has_dynamic_definition(&self) -> bool {
        self.parse_definition()
            .map(|def| !def.steps.is_empty())
            .unwrap_or(false)
    }

    /// Activates the workflow; requires a parseable definition with at
    /// least one step.
    pub fn activate(&mut self) -> Result<(), Error> {
        let def = self.parse_definition()?;
        if def.steps.is_empty() {
            return Err(Error::Validation("workflow has no steps".into()));
        }
        self.status = WorkflowStatus::Active;
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.status = WorkflowStatus::Inactive;
    }
}
