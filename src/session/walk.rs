//! Walk, subtree and table retrieval.
//!
//! A walk repeatedly asks for whatever comes after the last OID seen:
//! GetNext on v1, GetBulk with no non-repeaters on v2c and v3. Each batch
//! goes to a caller closure that returns `true` to stop early.

use std::collections::BTreeMap;

use tracing::instrument;

use super::Session;
use crate::error::{Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::value::Value;
use crate::varbind::{VarBind, varbind_error};
use crate::version::Version;

/// Rows keyed by index OID, then columns keyed by column number.
pub type Table = BTreeMap<Oid, BTreeMap<u32, Value>>;

impl Session {
    /// Walk the MIB from `oid`, handing each batch to `feed`.
    ///
    /// Ends when `feed` returns `true`, on endOfMibView (v2c/v3), on a
    /// noSuchName error (v1), or when a batch brings no OID past the last
    /// one.
    /// Any other error aborts the walk and is returned.
    #[instrument(skip_all, err, fields(snmp.target = %self.target(), snmp.oid = %oid))]
    pub async fn walk<F>(&self, oid: &Oid, max_repetitions: Option<i32>, mut feed: F) -> Result<()>
    where
        F: FnMut(&[VarBind]) -> bool,
    {
        let max_repetitions = max_repetitions.unwrap_or(self.inner.max_repetitions);
        let mut next = oid.clone();
        loop {
            let seed = match self.version() {
                Version::V1 => {
                    let varbinds = match self.get_next(std::slice::from_ref(&next)).await {
                        Ok(varbinds) => varbinds,
                        Err(Error::RequestFailed {
                            status: ErrorStatus::NoSuchName,
                            ..
                        }) => return Ok(()),
                        Err(e) => return Err(e),
                    };
                    if feed(&varbinds) {
                        return Ok(());
                    }
                    varbinds.first().map(|vb| vb.oid.clone())
                }
                Version::V2c | Version::V3 => {
                    let mut column = self
                        .get_bulk(std::slice::from_ref(&next), 0, max_repetitions)
                        .await?
                        .into_iter()
                        .next()
                        .map(|result| result.into_column())
                        .unwrap_or_default();

                    let before = column.len();
                    column.retain(|vb| !matches!(vb.value, Value::EndOfMibView));
                    let end_of_mib = column.len() != before;

                    if feed(&column) || end_of_mib {
                        return Ok(());
                    }
                    column.last().map(|vb| vb.oid.clone())
                }
            };

            match seed {
                Some(oid) if oid.follows(&next) => next = oid,
                _ => {
                    tracing::debug!(
                        target: "snmp_session::session",
                        { snmp.oid = %next },
                        "no progress, ending walk"
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Walk only the subtree rooted at `oid`.
    ///
    /// Varbinds past the subtree are dropped and the walk stops at the first
    /// one. `feed` is not called with an empty batch.
    pub async fn subtree<F>(
        &self,
        oid: &Oid,
        max_repetitions: Option<i32>,
        mut feed: F,
    ) -> Result<()>
    where
        F: FnMut(&[VarBind]) -> bool,
    {
        self.walk(oid, max_repetitions, |varbinds| {
            let inside = varbinds
                .iter()
                .take_while(|vb| vb.oid.in_subtree(oid))
                .count();
            let stop = !varbinds[..inside].is_empty() && feed(&varbinds[..inside]);
            stop || inside < varbinds.len()
        })
        .await
    }

    /// Retrieve a conceptual table: every column of every row under the
    /// entry OID `oid.1`.
    #[instrument(skip_all, err, fields(snmp.target = %self.target(), snmp.oid = %oid))]
    pub async fn table(&self, oid: &Oid, max_repetitions: Option<i32>) -> Result<Table> {
        let row_oid = oid.child(1);
        let mut rows = TableBuilder::new(&row_oid);
        self.subtree(&row_oid, max_repetitions, |varbinds| rows.feed(varbinds))
            .await?;
        rows.finish()
    }

    /// Retrieve only the listed columns of a table, one subtree walk per
    /// column in the order given.
    #[instrument(skip_all, err, fields(snmp.target = %self.target(), snmp.oid = %oid))]
    pub async fn table_columns(
        &self,
        oid: &Oid,
        columns: &[u32],
        max_repetitions: Option<i32>,
    ) -> Result<Table> {
        let row_oid = oid.child(1);
        let mut rows = TableBuilder::new(&row_oid);
        for &column in columns {
            self.subtree(&row_oid.child(column), max_repetitions, |varbinds| {
                rows.feed(varbinds)
            })
            .await?;
            if rows.error.is_some() {
                break;
            }
        }
        rows.finish()
    }
}

/// Folds walked varbinds into rows.
struct TableBuilder<'a> {
    row_oid: &'a Oid,
    table: Table,
    error: Option<Error>,
}

impl<'a> TableBuilder<'a> {
    fn new(row_oid: &'a Oid) -> Self {
        Self {
            row_oid,
            table: Table::new(),
            error: None,
        }
    }

    /// Returns `true` once an exception value has been seen.
    fn feed(&mut self, varbinds: &[VarBind]) -> bool {
        for vb in varbinds {
            if let Some(e) = varbind_error(vb) {
                self.error = Some(e);
                return true;
            }
            // <row_oid>.<column>.<index...>; column 0 is not a column.
            if let Some([column, index @ ..]) = vb.oid.suffix_after(self.row_oid) {
                if *column > 0 && !index.is_empty() {
                    self.table
                        .entry(Oid::from_slice(index))
                        .or_default()
                        .insert(*column, vb.value.clone());
                }
            }
        }
        false
    }

    fn finish(self) -> Result<Table> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.table),
        }
    }
}
