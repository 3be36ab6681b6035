// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod encoding;
pub mod space;
pub mod types;

pub use encoding::{encode, encode_batch, EncodedVector, EncodingError};
pub use space::{EncodingKind, SpaceError, SpaceType};
pub use types::{BuildParams, Document, QueryMatch, QueryParams};
