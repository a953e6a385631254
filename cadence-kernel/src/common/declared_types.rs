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

use tracing::*;

use crate::actor::ActorCell;
use crate::common::KernelError;
use crate::traits::TypeResolver;

/// Resolved type given to ports that declare none.
pub const GENERAL_TYPE: &str = "general";

/// Type resolver that trusts declarations.
///
/// Every port resolves to its declared type, or [`GENERAL_TYPE`] when it has
/// none. A connection between two ports that both declare a type must
/// declare the same one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredTypeResolver;

impl DeclaredTypeResolver {
    fn resolve_cell(&self, cell: &ActorCell) -> Result<(), KernelError> {
        for port in cell.ports() {
            port.set_resolved_type(port.declared_type().unwrap_or(GENERAL_TYPE));
        }
        for connection in cell.connections() {
            if let (Some(source), Some(sink)) = (connection.from.declared_type(), connection.to.declared_type()) {
                if source != sink {
                    return Err(KernelError::TypeConflict {
                        source: connection.from.full_name(),
                        sink: connection.to.full_name(),
                    });
                }
            }
        }
        for child in cell.children() {
            self.resolve_cell(&child)?;
        }
        Ok(())
    }
}

impl TypeResolver for DeclaredTypeResolver {
    fn resolve(&self, top: &Arc<ActorCell>) -> Result<(), KernelError> {
        trace!(top = %top.full_name(), "resolving declared types");
        self.resolve_cell(top)
    }
}
