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

use crate::message::KernelEvent;

/// Observer of kernel events.
///
/// Called synchronously from whichever task produced the event, so
/// implementations must be quick and must not call back into the component
/// that emitted the event. Listeners observe; nothing they do feeds back into
/// scheduling decisions.
pub trait EventListener: Send + Sync {
    /// Receives one event.
    fn on_event(&self, event: &KernelEvent);
}
