/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

/// Per-actor decoration along one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AspectAttributes {
    /// Whether the scheduler is consulted for this actor.
    pub enabled: bool,
    /// Declared cost of one firing, in model time units.
    pub execution_time: f64,
    /// Used by priority policies; lower is more urgent.
    pub priority: i64,
    /// Relative deadline of each request; `None` means no deadline.
    pub deadline: Option<f64>,
    /// Assigned by the scheduler at the start of a run.
    pub sequence_number: Option<u64>,
}

impl AspectAttributes {
    /// Enabled decoration with the given execution time.
    #[must_use]
    pub const fn new(execution_time: f64) -> Self {
        Self {
            enabled: true,
            execution_time,
            priority: 0,
            deadline: None,
            sequence_number: None,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the relative deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: f64) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Keeps the values but stops consulting the scheduler.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
