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

use std::sync::Arc;

use crate::actor::ActorCell;
use crate::common::KernelError;

/// Seam to the type-checking subsystem.
///
/// The manager calls `resolve` strictly after `preinitialize` and before
/// `initialize`. An implementation assigns a resolved type to every port it
/// can; directors refuse to initialize actors whose ports remain unresolved.
pub trait TypeResolver: Send + Sync {
    /// Resolves the port types of `top` and everything it contains.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::TypeConflict`] (or any other error) when the
    /// model cannot be typed.
    fn resolve(&self, top: &Arc<ActorCell>) -> Result<(), KernelError>;
}
