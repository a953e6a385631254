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
use cadence_kernel::prelude::*;

/// Numbered payload produced by the test sources.
#[cadence_token]
#[derive(PartialEq, Eq)]
pub struct Sample {
    pub value: u64,
}

impl Sample {
    pub fn token(value: u64) -> Token {
        Token::new(Self { value })
    }

    /// Reads the value back out of a token, if it carries a `Sample`.
    pub fn value_of(token: &Token) -> Option<u64> {
        token.downcast_ref::<Self>().map(|sample| sample.value)
    }
}
