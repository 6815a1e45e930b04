//! Schedule component RPCs.
//!
//! Create/Update take a nested job description that does not map onto flat
//! flags; only the deletion RPCs are surfaced, matching the operations the
//! fleet tool actually needs.

use serde::{Deserialize, Serialize};

use super::decode_as;
use crate::{ComponentCatalog, FieldKind, FieldSpec, RequestDescriptor};

pub static COMPONENT: ComponentCatalog = ComponentCatalog {
    name: "schedule",
    about: "RPCs related to managing schedules",
    requests: &[
        RequestDescriptor {
            method: "Schedule.Delete",
            about: "Delete a scheduled job",
            fields: &[FieldSpec {
                path: "id",
                kind: FieldKind::UInt,
                nullable: false,
                help: "Id of the scheduled job",
            }],
            decode: |raw| decode_as::<ScheduleRevResponse>("Schedule.Delete", raw),
        },
        RequestDescriptor {
            method: "Schedule.DeleteAll",
            about: "Delete every scheduled job",
            fields: &[],
            decode: |raw| decode_as::<ScheduleRevResponse>("Schedule.DeleteAll", raw),
        },
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRevResponse {
    /// Revision of the schedule list after the mutation.
    pub rev: u64,
}
