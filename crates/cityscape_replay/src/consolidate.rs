//! Entity consolidation: deduplicating a raw event range for listing.
//!
//! `consolidate` is pure and re-entrant: it can run over the whole trace or
//! over a sub-range extracted by [`crate::boundary::child_range`], and the
//! output can seed another extraction, which is how drill-down navigation
//! works. Two numberings coexist: `step_indices` are positions in the slice
//! being visited (for drilling further), while value samples carry each
//! event's own `index` stamp (absolute trace time, which survives slicing).

use crate::boundary::{Container, ContainerKind};
use crate::entity::ValueSample;
use cityscape_trace::{EventKind, TraceEvent};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One deduplicated entity summarizing part of an event range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "camelCase")]
pub enum ConsolidatedEntity {
    /// DECL, ASSIGN, and PARAM events merged by `(subject, address)`
    #[serde(rename_all = "camelCase")]
    Variable {
        /// Variable name
        subject: Option<String>,
        /// Captured address, part of the merge identity
        address: Option<String>,
        /// PARAM when the first occurrence was a parameter, DECL otherwise
        color_type: EventKind,
        /// Every value in visit order, stamped with absolute event indices
        values: Vec<ValueSample>,
        /// Value of the latest occurrence
        current_value: Option<String>,
        /// Slice positions of every merged occurrence, in visit order
        step_indices: Vec<usize>,
    },
    /// LOOP events merged by `(subtype, condition)`
    #[serde(rename_all = "camelCase")]
    Loop {
        /// Loop flavor ("for", "while")
        subtype: Option<String>,
        /// Condition source text
        condition: Option<String>,
        /// Number of merged evaluations, the terminating one included
        iterations: u32,
        /// Condition result of the latest evaluation
        running: bool,
        /// Slice positions of every merged occurrence, in visit order
        step_indices: Vec<usize>,
    },
    /// Any other event, one entity per occurrence
    #[serde(rename_all = "camelCase")]
    Event {
        /// The event's kind
        kind: EventKind,
        /// The event's subject
        subject: Option<String>,
        /// The event's formatted value
        value: Option<String>,
        /// Slice position of the occurrence
        step_indices: Vec<usize>,
    },
}

impl ConsolidatedEntity {
    /// Slice position of the first merged occurrence.
    #[must_use]
    pub fn first_index(&self) -> Option<usize> {
        let indices = match self {
            Self::Variable { step_indices, .. }
            | Self::Loop { step_indices, .. }
            | Self::Event { step_indices, .. } => step_indices,
        };
        indices.first().copied()
    }

    /// The container this entity opens, if it is one.
    ///
    /// Calls, loops, and conditions contain other events; returns, branches,
    /// and variables are leaves.
    #[must_use]
    pub fn as_container(&self) -> Option<Container> {
        match self {
            Self::Loop {
                condition,
                step_indices,
                ..
            } => {
                let mut container = Container::new(ContainerKind::Loop, *step_indices.first()?);
                if let Some(condition) = condition {
                    container = container.with_condition(condition.clone());
                }
                Some(container)
            }
            Self::Event {
                kind: EventKind::Call,
                step_indices,
                ..
            } => Some(Container::new(ContainerKind::Call, *step_indices.first()?)),
            Self::Event {
                kind: EventKind::Condition,
                subject,
                step_indices,
                ..
            } => {
                let mut container =
                    Container::new(ContainerKind::Condition, *step_indices.first()?);
                if let Some(subject) = subject {
                    container = container.with_condition(subject.clone());
                }
                Some(container)
            }
            _ => None,
        }
    }
}

/// Consolidates the events at `indices` into deduplicated entities.
///
/// Output order equals first-occurrence order. Indices out of range for
/// `events` are skipped.
#[must_use]
pub fn consolidate(indices: &[usize], events: &[TraceEvent]) -> Vec<ConsolidatedEntity> {
    let mut entities: Vec<ConsolidatedEntity> = Vec::new();
    let mut variable_slots: IndexMap<(Option<String>, Option<String>), usize> = IndexMap::new();
    let mut loop_slots: IndexMap<(Option<String>, Option<String>), usize> = IndexMap::new();

    for &index in indices {
        let Some(event) = events.get(index) else {
            continue;
        };
        match event.kind {
            // Data-flow relation, consumed elsewhere; never a standalone
            // entity.
            EventKind::Read => {}
            EventKind::Decl | EventKind::Assign | EventKind::Param => {
                let identity = (event.subject.clone(), event.address.clone());
                if let Some(&slot) = variable_slots.get(&identity) {
                    if let ConsolidatedEntity::Variable {
                        values,
                        current_value,
                        step_indices,
                        ..
                    } = &mut entities[slot]
                    {
                        values.push(ValueSample {
                            step: event.index,
                            value: event.value.clone(),
                        });
                        current_value.clone_from(&event.value);
                        step_indices.push(index);
                    }
                } else {
                    variable_slots.insert(identity, entities.len());
                    let color_type = if event.kind == EventKind::Param {
                        EventKind::Param
                    } else {
                        EventKind::Decl
                    };
                    entities.push(ConsolidatedEntity::Variable {
                        subject: event.subject.clone(),
                        address: event.address.clone(),
                        color_type,
                        values: vec![ValueSample {
                            step: event.index,
                            value: event.value.clone(),
                        }],
                        current_value: event.value.clone(),
                        step_indices: vec![index],
                    });
                }
            }
            EventKind::Loop => {
                let condition = event.condition_text().map(str::to_string);
                let identity = (event.subtype.clone(), condition.clone());
                if let Some(&slot) = loop_slots.get(&identity) {
                    if let ConsolidatedEntity::Loop {
                        iterations,
                        running,
                        step_indices,
                        ..
                    } = &mut entities[slot]
                    {
                        *iterations += 1;
                        *running = event.condition_holds();
                        step_indices.push(index);
                    }
                } else {
                    loop_slots.insert(identity, entities.len());
                    entities.push(ConsolidatedEntity::Loop {
                        subtype: event.subtype.clone(),
                        condition,
                        iterations: 1,
                        running: event.condition_holds(),
                        step_indices: vec![index],
                    });
                }
            }
            EventKind::Call
            | EventKind::Return
            | EventKind::Condition
            | EventKind::Branch
            | EventKind::ExternalCall
            | EventKind::Unknown => {
                entities.push(ConsolidatedEntity::Event {
                    kind: event.kind,
                    subject: event.subject.clone(),
                    value: event.value.clone(),
                    step_indices: vec![index],
                });
            }
        }
    }
    entities
}

/// Consolidates a whole slice, visiting every position in order.
#[must_use]
pub fn consolidate_all(events: &[TraceEvent]) -> Vec<ConsolidatedEntity> {
    let indices: Vec<usize> = (0..events.len()).collect();
    consolidate(&indices, events)
}
