//! GetBulk response splitting.
//!
//! A GetBulk response is flat: the answers to the non-repeaters come
//! first, then `max_repetitions` rounds with one varbind per repeated
//! request OID. [`split_bulk`] undoes that interleaving.

use crate::error::{Error, Result};
use crate::varbind::{VarBind, is_varbind_error};

/// One entry of a split GetBulk response, in request order.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkResult {
    /// Answer to a non-repeater.
    Scalar(VarBind),
    /// Successive answers to one repeated OID.
    Column(Vec<VarBind>),
}

impl BulkResult {
    pub fn as_scalar(&self) -> Option<&VarBind> {
        match self {
            BulkResult::Scalar(vb) => Some(vb),
            BulkResult::Column(_) => None,
        }
    }

    pub fn as_column(&self) -> Option<&[VarBind]> {
        match self {
            BulkResult::Scalar(_) => None,
            BulkResult::Column(column) => Some(column),
        }
    }

    pub fn into_column(self) -> Vec<VarBind> {
        match self {
            BulkResult::Scalar(vb) => vec![vb],
            BulkResult::Column(column) => column,
        }
    }
}

fn precede_error(request: &VarBind, req_index: usize, response: &VarBind, resp_index: usize) -> Error {
    Error::invalid_response(format!(
        "OID '{}' in request at position '{req_index}' does not precede OID '{}' in response at position '{resp_index}'",
        request.oid, response.oid
    ))
}

/// Partition a GetBulk response into scalars and columns.
///
/// Every returned varbind must be an exception or strictly follow the
/// request OID it answers.
pub fn split_bulk(
    request: &[VarBind],
    non_repeaters: usize,
    response: Vec<VarBind>,
) -> Result<Vec<BulkResult>> {
    let non_repeaters = non_repeaters.min(request.len());
    if response.len() < non_repeaters {
        return Err(Error::invalid_response(format!(
            "Varbind count in response '{}' is less than non-repeaters '{non_repeaters}' in request",
            response.len()
        )));
    }

    let repeaters = request.len() - non_repeaters;
    let repeated = response.len() - non_repeaters;
    let divisible = if repeaters == 0 {
        repeated == 0
    } else {
        repeated % repeaters == 0
    };
    if !divisible {
        return Err(Error::invalid_response(format!(
            "Varbind count in response '{}' is not a multiple of repeaters '{repeaters}' plus non-repeaters '{non_repeaters}' in request",
            response.len()
        )));
    }

    let mut results = Vec::with_capacity(request.len());
    let mut columns: Vec<Vec<VarBind>> = (0..repeaters)
        .map(|_| Vec::with_capacity(repeated / repeaters.max(1)))
        .collect();

    for (i, vb) in response.into_iter().enumerate() {
        let req_index = if i < non_repeaters {
            i
        } else {
            non_repeaters + (i - non_repeaters) % repeaters
        };
        let req = &request[req_index];
        if !is_varbind_error(&vb) && !vb.oid.follows(&req.oid) {
            return Err(precede_error(req, req_index, &vb, i));
        }
        if i < non_repeaters {
            results.push(BulkResult::Scalar(vb));
        } else {
            columns[req_index - non_repeaters].push(vb);
        }
    }

    results.extend(columns.into_iter().map(BulkResult::Column));
    Ok(results)
}
