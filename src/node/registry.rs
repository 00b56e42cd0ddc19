// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

use std::collections::HashMap;

use snafu::Snafu;

use super::BoxedNode;
use crate::lang::error::PatchResult;
use crate::lang::factory::Factory;
use crate::lang::lexer::{Token, TokenStream};

/// Construct a node from the arguments following its keyword.
///
/// The keyword token is passed along, so that kinds with several aliases can tell
/// them apart and so that diagnostics can point at it.
pub type BuildFn = fn(&mut Factory, &mut TokenStream, &Token) -> PatchResult<BoxedNode>;

/// Stateless description of a node kind, able to build new instances.
#[derive(Clone, Copy)]
pub struct Prototype {
    pub kind: &'static str,
    pub aliases: &'static [&'static str],
    pub build: BuildFn,
}

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum RegistryError {
    #[snafu(display("alias '{}' of '{}' is already registered by '{}'", alias, kind, existing))]
    DuplicateAlias {
        alias: String,
        kind: String,
        existing: String,
    },
}

/// Maps every keyword to the node kind it builds.
pub struct Registry {
    prototypes: HashMap<&'static str, Prototype>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            prototypes: HashMap::new(),
        }
    }

    /// Registry containing every built-in node kind.
    pub fn standard() -> Result<Self, RegistryError> {
        let mut registry = Self::empty();
        super::oscillator::register(&mut registry)?;
        super::filter::register(&mut registry)?;
        super::modulator::register(&mut registry)?;
        super::envelope::register(&mut registry)?;
        super::effect::register(&mut registry)?;
        super::routing::register(&mut registry)?;
        super::chain::register(&mut registry)?;
        Ok(registry)
    }

    /// Add a node kind under all of its aliases.
    ///
    /// Fails without modifying the registry if any alias is taken already.
    pub fn register(&mut self, prototype: Prototype) -> Result<(), RegistryError> {
        for alias in prototype.aliases {
            if let Some(existing) = self.prototypes.get(alias) {
                return Err(RegistryError::DuplicateAlias {
                    alias: alias.to_string(),
                    kind: prototype.kind.to_owned(),
                    existing: existing.kind.to_owned(),
                });
            }
        }
        for alias in prototype.aliases {
            self.prototypes.insert(*alias, prototype);
        }
        Ok(())
    }

    pub fn lookup(&self, alias: &str) -> Option<&Prototype> {
        self.prototypes.get(alias)
    }

    /// All registered keywords in alphabetical order.
    pub fn aliases(&self) -> Vec<&'static str> {
        let mut aliases: Vec<_> = self.prototypes.keys().copied().collect();
        aliases.sort_unstable();
        aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(
        _factory: &mut Factory,
        _stream: &mut TokenStream,
        _keyword: &Token,
    ) -> PatchResult<BoxedNode> {
        Ok(crate::node::testing::constant(0.0, 0.0))
    }

    #[test]
    fn duplicate_alias_is_rejected() {
        let mut registry = Registry::empty();
        registry
            .register(Prototype {
                kind: "sine",
                aliases: &["sin", "sinus"],
                build: dummy,
            })
            .unwrap();
        let err = registry
            .register(Prototype {
                kind: "sign",
                aliases: &["sig", "sin"],
                build: dummy,
            })
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateAlias {
                alias: "sin".to_owned(),
                kind: "sign".to_owned(),
                existing: "sine".to_owned(),
            }
        );
        // Nothing of the rejected kind was registered
        assert!(registry.lookup("sig").is_none());
    }

    #[test]
    fn standard_registry_has_every_kind() {
        let registry = Registry::standard().unwrap();
        for alias in &[
            "sin", "sinus", "sq", "square", "tri", "triangle", "wnoise", "blep", "level", "low",
            "high", "reso", "iir", "lowf", "am", "fm", "adsr", "envelope", "env", "distortion",
            "distorsion", "clamp", "reverb", "echo", "avc", "{", "left", "right", "mono", "chain",
        ] {
            assert!(registry.lookup(alias).is_some(), "missing {}", alias);
        }
        assert_eq!(registry.lookup("sinus").unwrap().kind, "sine");
    }
}
