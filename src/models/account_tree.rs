use std::collections::HashMap;

use super::{Account, AssetKind, Id, IdError};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AccountTreeError {
    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error("duplicate account id {0}")]
    DuplicateId(Id),

    #[error("account {0} cannot be its own parent")]
    SelfParent(Id),

    #[error("account {child} references unknown parent {parent}")]
    UnknownParent { child: Id, parent: Id },

    #[error("account {child} is nested under {parent}, which is itself a sub-account")]
    TooDeep { child: Id, parent: Id },
}

/// A two-level account hierarchy indexed by id.
///
/// Children point at their parent by id only; edges are kept in a separate
/// lookup so no account owns another.
#[derive(Debug, Clone, Default)]
pub struct AccountTree {
    accounts: HashMap<Id, Account>,
    roots: Vec<Id>,
    children: HashMap<Id, Vec<Id>>,
}

impl AccountTree {
    /// Builds the tree from a flat list, preserving input order among siblings.
    pub fn build(accounts: Vec<Account>) -> Result<Self, AccountTreeError> {
        let mut by_id: HashMap<Id, Account> = HashMap::with_capacity(accounts.len());
        let mut order = Vec::with_capacity(accounts.len());

        for account in accounts {
            Id::from_string_checked(account.id.as_str())?;
            if by_id.contains_key(&account.id) {
                return Err(AccountTreeError::DuplicateId(account.id));
            }
            order.push(account.id.clone());
            by_id.insert(account.id.clone(), account);
        }

        let mut roots = Vec::new();
        let mut children: HashMap<Id, Vec<Id>> = HashMap::new();

        for id in order {
            let Some(account) = by_id.get(&id) else {
                continue;
            };
            match &account.parent_id {
                None => roots.push(id),
                Some(parent_id) if *parent_id == id => {
                    return Err(AccountTreeError::SelfParent(id));
                }
                Some(parent_id) => {
                    let parent = by_id.get(parent_id).ok_or_else(|| {
                        AccountTreeError::UnknownParent {
                            child: id.clone(),
                            parent: parent_id.clone(),
                        }
                    })?;
                    if parent.parent_id.is_some() {
                        return Err(AccountTreeError::TooDeep {
                            child: id.clone(),
                            parent: parent_id.clone(),
                        });
                    }
                    children.entry(parent_id.clone()).or_default().push(id);
                }
            }
        }

        Ok(Self {
            accounts: by_id,
            roots,
            children,
        })
    }

    pub fn get(&self, id: &Id) -> Option<&Account> {
        self.accounts.get(id)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Account> + '_ {
        self.roots.iter().filter_map(|id| self.accounts.get(id))
    }

    pub fn children(&self, id: &Id) -> impl Iterator<Item = &Account> + '_ {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.accounts.get(child))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Distinct uppercase currency/symbol codes held by accounts of `kind`.
    pub fn codes_of_kind(&self, kind: AssetKind) -> Vec<String> {
        let mut codes: Vec<String> = self
            .accounts
            .values()
            .filter(|a| a.kind == kind && !a.is_group())
            .map(|a| a.currency.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }
}
