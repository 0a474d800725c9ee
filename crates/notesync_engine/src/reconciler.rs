//! Notebook and tag membership reconciliation.

use crate::error::SyncResult;
use crate::remote::RemoteSyncClient;
use crate::store::{DocumentId, LocalStore, LocalTerm, NewTerm};
use notesync_protocol::{Binding, BindingKind, TaxonomyIndex};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Bindings to remove from and add to a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingDiff {
    /// Local bindings absent remotely.
    pub remove: Vec<Binding>,
    /// Remote bindings absent locally.
    pub add: Vec<Binding>,
}

impl BindingDiff {
    /// Returns true when local and remote bindings agree.
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

/// Brings a document's local bindings in line with its remote note.
pub struct NotebookTagReconciler<'a> {
    store: &'a dyn LocalStore,
    remote: &'a dyn RemoteSyncClient,
}

impl<'a> NotebookTagReconciler<'a> {
    /// Creates a reconciler over a store and a remote.
    pub fn new(store: &'a dyn LocalStore, remote: &'a dyn RemoteSyncClient) -> Self {
        Self { store, remote }
    }

    /// Computes the symmetric difference between two binding lists.
    ///
    /// Both sides keep their input order and list each binding once.
    pub fn diff(local: &[Binding], remote: &[Binding]) -> BindingDiff {
        let local_set: BTreeSet<&Binding> = local.iter().collect();
        let remote_set: BTreeSet<&Binding> = remote.iter().collect();

        let mut seen = BTreeSet::new();
        let remove = local
            .iter()
            .filter(|b| !remote_set.contains(b) && seen.insert(*b))
            .cloned()
            .collect();
        let mut seen = BTreeSet::new();
        let add = remote
            .iter()
            .filter(|b| !local_set.contains(b) && seen.insert(*b))
            .cloned()
            .collect();
        BindingDiff { remove, add }
    }

    /// Applies the difference between `local` and `remote` to `document`.
    ///
    /// Terms for added bindings are created on demand. Returns the applied
    /// difference.
    pub fn reconcile(
        &self,
        document: DocumentId,
        local: &[Binding],
        remote: &[Binding],
        index: &TaxonomyIndex,
    ) -> SyncResult<BindingDiff> {
        let diff = Self::diff(local, remote);
        for binding in &diff.remove {
            match self.store.find_term(binding.kind, &binding.guid)? {
                Some(term) => self.store.unbind_term(document, term.id)?,
                None => debug!(%document, %binding, "no local term for stale binding"),
            }
        }
        for binding in &diff.add {
            let term = self.resolve_term(binding, index)?;
            self.store.bind_term(document, term.id)?;
        }
        if !diff.is_empty() {
            debug!(
                %document,
                removed = diff.remove.len(),
                added = diff.add.len(),
                "reconciled bindings"
            );
        }
        Ok(diff)
    }

    /// Finds the local term for a binding, creating it if needed.
    pub fn resolve_term(&self, binding: &Binding, index: &TaxonomyIndex) -> SyncResult<LocalTerm> {
        match binding.kind {
            BindingKind::Notebook => self.resolve_notebook(&binding.guid, index),
            BindingKind::Tag => self.resolve_tag(&binding.guid, index, &mut BTreeSet::new()),
        }
    }

    fn resolve_notebook(&self, guid: &str, index: &TaxonomyIndex) -> SyncResult<LocalTerm> {
        if let Some(term) = self.store.find_term(BindingKind::Notebook, guid)? {
            return Ok(term);
        }
        let name = match self.remote.get_notebook(guid) {
            Ok(notebook) => notebook.name,
            Err(e) if e.is_retryable() => return Err(e),
            Err(e) => {
                let name = index.notebook_name(guid).unwrap_or(guid).to_string();
                warn!(guid, error = %e, name = %name, "notebook lookup failed, using fallback name");
                name
            }
        };
        self.store.create_term(NewTerm {
            kind: BindingKind::Notebook,
            guid: guid.to_string(),
            name,
            parent: None,
        })
    }

    fn resolve_tag<'g>(
        &self,
        guid: &'g str,
        index: &'g TaxonomyIndex,
        visiting: &mut BTreeSet<&'g str>,
    ) -> SyncResult<LocalTerm> {
        if let Some(term) = self.store.find_term(BindingKind::Tag, guid)? {
            return Ok(term);
        }
        visiting.insert(guid);

        let parent = match index.tag_parent(guid) {
            Some(parent) if visiting.contains(parent) => {
                warn!(guid, parent, "tag hierarchy cycle, creating tag without parent");
                None
            }
            Some(parent) => Some(self.resolve_tag(parent, index, visiting)?.id),
            None => None,
        };

        let name = match index.tag_name(guid) {
            Some(name) => name.to_string(),
            None => {
                warn!(guid, "tag name not cached yet, using guid as placeholder");
                guid.to_string()
            }
        };
        self.store.create_term(NewTerm {
            kind: BindingKind::Tag,
            guid: guid.to_string(),
            name,
            parent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use crate::store::{MemoryLocalStore, NewDocument};
    use notesync_protocol::RemoteTag;

    fn tag(guid: &str, name: &str, parent: Option<&str>) -> RemoteTag {
        RemoteTag {
            guid: guid.into(),
            name: name.into(),
            parent_guid: parent.map(Into::into),
        }
    }

    #[test]
    fn diff_is_symmetric_difference() {
        let local = [Binding::tag("A"), Binding::tag("B")];
        let remote = [Binding::tag("B"), Binding::tag("C")];
        let diff = NotebookTagReconciler::diff(&local, &remote);
        assert_eq!(diff.remove, vec![Binding::tag("A")]);
        assert_eq!(diff.add, vec![Binding::tag("C")]);
    }

    #[test]
    fn diff_collapses_duplicates() {
        let local = [Binding::tag("A"), Binding::tag("A")];
        let remote = [Binding::notebook("N"), Binding::tag("C"), Binding::tag("C")];
        let diff = NotebookTagReconciler::diff(&local, &remote);
        assert_eq!(diff.remove, vec![Binding::tag("A")]);
        assert_eq!(diff.add, vec![Binding::notebook("N"), Binding::tag("C")]);
        assert!(NotebookTagReconciler::diff(&remote, &remote).is_empty());
    }

    #[test]
    fn diff_distinguishes_kinds() {
        let diff = NotebookTagReconciler::diff(&[Binding::tag("X")], &[Binding::notebook("X")]);
        assert_eq!(diff.remove, vec![Binding::tag("X")]);
        assert_eq!(diff.add, vec![Binding::notebook("X")]);
    }

    #[test]
    fn reconcile_creates_terms_and_binds() {
        let store = MemoryLocalStore::new();
        let remote = MockRemote::new();
        remote.put_notebook("nb1", "Inbox");
        let mut index = TaxonomyIndex::new();
        index.merge_tags([&tag("t1", "work", None)]);

        let doc = store.create_document(NewDocument::default()).unwrap();
        let reconciler = NotebookTagReconciler::new(&store, &remote);
        let wanted = [Binding::notebook("nb1"), Binding::tag("t1"), Binding::tag("t2")];
        let diff = reconciler.reconcile(doc, &[], &wanted, &index).unwrap();
        assert_eq!(diff.add.len(), 3);

        let names: Vec<_> = store.terms().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Inbox", "work", "t2"]);
        assert_eq!(store.document(doc).unwrap().unwrap().bindings, wanted.to_vec());

        let current = store.document(doc).unwrap().unwrap().bindings;
        let diff = reconciler
            .reconcile(doc, &current, &[Binding::notebook("nb1")], &index)
            .unwrap();
        assert_eq!(diff.remove.len(), 2);
        assert_eq!(
            store.document(doc).unwrap().unwrap().bindings,
            vec![Binding::notebook("nb1")]
        );
        assert_eq!(store.terms().len(), 3);
    }

    #[test]
    fn notebook_falls_back_to_cached_name() {
        let store = MemoryLocalStore::new();
        let remote = MockRemote::new();
        let mut index = TaxonomyIndex::new();
        index.merge_notebooks([&notesync_protocol::RemoteNotebook {
            guid: "nb9".into(),
            name: "Archive".into(),
            stack: None,
        }]);
        let reconciler = NotebookTagReconciler::new(&store, &remote);
        let term = reconciler
            .resolve_term(&Binding::notebook("nb9"), &index)
            .unwrap();
        assert_eq!(term.name, "Archive");
    }

    #[test]
    fn unreachable_remote_aborts_notebook_creation() {
        let store = MemoryLocalStore::new();
        let remote = MockRemote::new();
        remote.set_online(false);
        let reconciler = NotebookTagReconciler::new(&store, &remote);
        let err = reconciler
            .resolve_term(&Binding::notebook("nb1"), &TaxonomyIndex::new())
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store.terms().is_empty());
    }

    #[test]
    fn tag_parents_are_created_first() {
        let store = MemoryLocalStore::new();
        let remote = MockRemote::new();
        let mut index = TaxonomyIndex::new();
        index.merge_tags([&tag("child", "Child", Some("root")), &tag("root", "Root", None)]);

        let reconciler = NotebookTagReconciler::new(&store, &remote);
        let child = reconciler.resolve_term(&Binding::tag("child"), &index).unwrap();
        let root = store.find_term(BindingKind::Tag, "root").unwrap().unwrap();
        assert_eq!(child.parent, Some(root.id));
        assert_eq!(root.parent, None);
    }

    #[test]
    fn tag_cycle_is_broken() {
        let store = MemoryLocalStore::new();
        let remote = MockRemote::new();
        let mut index = TaxonomyIndex::new();
        index.merge_tags([&tag("a", "A", Some("b")), &tag("b", "B", Some("a"))]);

        let reconciler = NotebookTagReconciler::new(&store, &remote);
        let a = reconciler.resolve_term(&Binding::tag("a"), &index).unwrap();
        let b = store.find_term(BindingKind::Tag, "b").unwrap().unwrap();
        assert_eq!(a.parent, Some(b.id));
        assert_eq!(b.parent, None);
    }
}
