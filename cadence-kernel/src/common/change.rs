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

use std::fmt;
use std::sync::Arc;

use crate::actor::ActorCell;
use crate::common::KernelError;

type Mutation = Box<dyn FnOnce(&Arc<ActorCell>) -> Result<(), KernelError> + Send>;

/// A deferred topology mutation.
///
/// Directors run queued requests against their container at a point where no
/// actor is firing: between iterations for the sequential director, with
/// every worker held for the process director.
pub struct ChangeRequest {
    description: String,
    mutation: Mutation,
}

impl ChangeRequest {
    /// Wraps a mutation. The closure receives the director's container.
    pub fn new<F>(description: impl Into<String>, mutation: F) -> Self
    where
        F: FnOnce(&Arc<ActorCell>) -> Result<(), KernelError> + Send + 'static,
    {
        Self {
            description: description.into(),
            mutation: Box::new(mutation),
        }
    }

    /// What the change does.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn execute(self, container: &Arc<ActorCell>) -> Result<(), KernelError> {
        (self.mutation)(container)
    }
}

impl fmt::Debug for ChangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRequest")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
