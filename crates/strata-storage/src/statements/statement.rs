//! Abstract, not-yet-executed mutations.

use strata_core::model::{DataType, EntityTypeId, ReferenceId};
use strata_core::payload::{Id, Value};

use crate::rules::StorageRule;

/// Handle of an instance whose id is assigned when its insert runs.
pub type PendingKey = usize;

/// An instance identifier that may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdRef {
    Existing(Id),
    Pending(PendingKey),
}

impl IdRef {
    pub fn pending_key(&self) -> Option<PendingKey> {
        match self {
            Self::Pending(key) => Some(*key),
            Self::Existing(_) => None,
        }
    }
}

/// One attribute column assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnWrite {
    pub table: String,
    pub column: String,
    pub value: Value,
    pub data_type: DataType,
}

/// A foreign-key column written as part of an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyWrite {
    pub reference: ReferenceId,
    pub table: String,
    pub column: String,
    pub target: IdRef,
    pub target_entity: EntityTypeId,
    /// The column may be written later by a trailing set-reference statement.
    pub deferrable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    pub key: PendingKey,
    /// Concrete entity type of the new instance.
    pub entity: EntityTypeId,
    /// Caller-supplied identifier, if any.
    pub id: Option<Id>,
    pub columns: Vec<ColumnWrite>,
    pub foreign_keys: Vec<ForeignKeyWrite>,
}

/// Version predicate and bump for optimistic locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    pub table: String,
    pub column: String,
    /// `None` bumps the version without checking it.
    pub expected: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRow {
    pub entity: EntityTypeId,
    pub id: Id,
    pub columns: Vec<ColumnWrite>,
    pub version: Option<VersionCheck>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRows {
    pub entity: EntityTypeId,
    pub ids: Vec<Id>,
}

/// One owner → target pairing of a reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLink {
    pub reference: ReferenceId,
    pub rule: StorageRule,
    pub owner: IdRef,
    pub owner_entity: EntityTypeId,
    /// `None` clears a single-valued foreign key.
    pub target: Option<IdRef>,
    pub target_entity: EntityTypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert(InsertRow),
    Update(UpdateRow),
    Delete(DeleteRows),
    /// Overwrite the owner's foreign-key column.
    SetReference(ReferenceLink),
    AddReference(ReferenceLink),
    RemoveReference(ReferenceLink),
}

impl Statement {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Insert(_) => "INSERT",
            Self::Update(_) => "UPDATE",
            Self::Delete(_) => "DELETE",
            Self::SetReference(_) => "SET_REFERENCE",
            Self::AddReference(_) => "ADD_REFERENCE",
            Self::RemoveReference(_) => "REMOVE_REFERENCE",
        }
    }

    /// Pending instances this statement needs to exist first.
    pub fn dependencies(&self) -> Vec<PendingKey> {
        match self {
            Self::Insert(row) => row
                .foreign_keys
                .iter()
                .filter_map(|fk| fk.target.pending_key())
                .collect(),
            Self::Update(_) | Self::Delete(_) => Vec::new(),
            Self::SetReference(link) | Self::AddReference(link) | Self::RemoveReference(link) => link
                .target
                .iter()
                .chain(std::iter::once(&link.owner))
                .filter_map(IdRef::pending_key)
                .collect(),
        }
    }

    /// The pending key this statement produces.
    pub fn produces(&self) -> Option<PendingKey> {
        match self {
            Self::Insert(row) => Some(row.key),
            _ => None,
        }
    }
}

/// Ordered statements of one logical operation plus the correlation tokens
/// of the instances they insert.
#[derive(Debug, Clone, Default)]
pub struct StatementBatch {
    pub statements: Vec<Statement>,
    next_key: PendingKey,
    /// Correlation tokens by pending key.
    pub client_references: Vec<(PendingKey, String)>,
}

impl StatementBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a key for an insert.
    pub fn pending(&mut self) -> PendingKey {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Number of statements of the given kind.
    pub fn count_of(&self, kind: &str) -> usize {
        self.statements.iter().filter(|s| s.kind_name() == kind).count()
    }
}
