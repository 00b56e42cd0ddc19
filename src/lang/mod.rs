// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! The patch language: tokens, macros and the factory turning them into nodes.

pub mod args;
pub mod defines;
pub mod error;
pub mod factory;
pub mod lexer;
pub mod span;

pub use error::{PatchError, PatchResult};
pub use factory::Factory;
pub use lexer::{Token, TokenStream};
