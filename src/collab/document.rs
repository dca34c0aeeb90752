use thiserror::Error;
use yrs::updates::decoder::Decode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use crate::protocol::CheckedDecoder;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("undecodable update: {0}")]
    Update(yrs::encoding::read::Error),
    #[error("update could not be integrated: {0}")]
    Integrate(String),
}

/// The live CRDT body of one note.
///
/// All writes go through [`SharedDocument::apply_update`]; the document is
/// never overwritten wholesale, so edits from any number of peers merge no
/// matter the order they arrive in.
pub struct SharedDocument {
    doc: Doc,
}

impl SharedDocument {
    pub fn new() -> Self {
        Self { doc: Doc::new() }
    }

    /// Whole document encoded as a single v1 update.
    pub fn full_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    pub fn state_vector(&self) -> StateVector {
        self.doc.transact().state_vector()
    }

    /// Minimal update a replica at `remote_sv` is missing.
    pub fn diff(&self, remote_sv: &StateVector) -> Vec<u8> {
        self.doc.transact().encode_diff_v1(remote_sv)
    }

    /// Integrates `update` and returns the resulting change, if any.
    ///
    /// The returned delta is what this transaction added: every struct that
    /// became visible (including previously pending ones unblocked by this
    /// update) plus the deletions it performed. `None` means the update was
    /// already known or is still waiting on missing dependencies.
    ///
    /// `update` comes straight off a socket, so it is decoded with
    /// [`CheckedDecoder`] and rejected before the transaction starts if any
    /// string in it is not UTF-8.
    pub fn apply_update(&self, update: &[u8]) -> Result<Option<Vec<u8>>, DocumentError> {
        let update = Update::decode(&mut CheckedDecoder::new(update)).map_err(DocumentError::Update)?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| DocumentError::Integrate(format!("{e:?}")))?;

        if txn.state_vector() == *txn.before_state() && txn.delete_set().is_empty() {
            return Ok(None);
        }
        Ok(Some(txn.encode_update_v1()))
    }
}

impl Default for SharedDocument {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use yrs::updates::decoder::Decode;
    use yrs::{Doc, GetString, ReadTxn, StateVector, Text, Transact, Update};

    /// Client-side replica editing the `quill` text like the browser editor.
    pub fn insert(doc: &Doc, index: u32, chunk: &str) -> Vec<u8> {
        let text = doc.get_or_insert_text("quill");
        let before = doc.transact().state_vector();
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, index, chunk);
        }
        doc.transact().encode_diff_v1(&before)
    }

    pub fn remove(doc: &Doc, index: u32, len: u32) -> Vec<u8> {
        let text = doc.get_or_insert_text("quill");
        let before = doc.transact().state_vector();
        {
            let mut txn = doc.transact_mut();
            text.remove_range(&mut txn, index, len);
        }
        doc.transact().encode_diff_v1(&before)
    }

    pub fn apply(doc: &Doc, update: &[u8]) {
        let mut txn = doc.transact_mut();
        txn.apply_update(Update::decode_v1(update).unwrap()).unwrap();
    }

    pub fn text_of(doc: &Doc) -> String {
        let text = doc.get_or_insert_text("quill");
        let txn = doc.transact();
        text.get_string(&txn)
    }

    pub fn text_of_state(state: &[u8]) -> String {
        let doc = Doc::new();
        apply(&doc, state);
        text_of(&doc)
    }

    pub fn empty_state_vector() -> StateVector {
        StateVector::default()
    }
}
