// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod delivery_state;
pub mod envelope;
pub mod outcome;
pub mod result_document;
pub mod task;
