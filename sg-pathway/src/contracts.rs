//! Parsed-contract lookup. spec.md §6 treats contract parsing as an
//! external concern (the wire form is parsed by `sg_types::Contract::parse`
//! upstream of the core); the executor only ever needs to look a contract
//! up by locus name to read its risk class, family, and declared schema.

use std::collections::BTreeMap;

use sg_types::Contract;

pub trait ContractLookup: Send + Sync {
    fn locus(&self, name: &str) -> Option<Contract>;
}

/// An in-memory table of already-parsed contracts, keyed by name. The
/// obvious implementation for tests and for a runtime that loads every
/// contract at startup.
#[derive(Debug, Default, Clone)]
pub struct StaticContracts(BTreeMap<String, Contract>);

impl StaticContracts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, contract: Contract) {
        self.0.insert(contract.name.clone(), contract);
    }
}

impl ContractLookup for StaticContracts {
    fn locus(&self, name: &str) -> Option<Contract> {
        self.0.get(name).cloned()
    }
}

impl FromIterator<Contract> for StaticContracts {
    fn from_iter<T: IntoIterator<Item = Contract>>(iter: T) -> Self {
        let mut table = Self::new();
        for contract in iter {
            table.insert(contract);
        }
        table
    }
}
