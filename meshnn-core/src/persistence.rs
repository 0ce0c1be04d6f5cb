//! Snapshot format (spec §6.2): a whole [`crate::Index`] serialized to a
//! single bincode stream and read back byte-for-byte equivalent in
//! structure (ids, edges, free list, entry point all preserved exactly;
//! only the distance function and heuristic, which aren't data, must be
//! supplied again at load time).
//!
//! The header carries a schema version ahead of the payload so a future,
//! incompatible layout change fails loudly as [`Error::Corrupt`] instead of
//! silently misinterpreting bytes.

use std::io::{Read, Write};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::arena::{Arena, ArenaParts, NodeId};
use crate::config::IndexParams;
use crate::distance::Scalar;
use crate::error::{Error, Result};
use crate::heuristic::Heuristic;
use crate::index::Index;

const MAGIC: u32 = 0x4D45_5348; // "MESH" in hex-packed ASCII order
const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotHeader {
    magic: u32,
    schema_version: u32,
}

#[derive(Serialize, Deserialize)]
struct SnapshotBody<L> {
    params: IndexParams,
    entry_point: Option<NodeId>,
    capacity: usize,
    labels: Vec<Option<L>>,
    max_layers: Vec<usize>,
    out_edges: Vec<Vec<Vec<u32>>>,
    in_edges: Vec<Option<Vec<Vec<u32>>>>,
    free_ids: Vec<NodeId>,
}

impl<L: Clone + Send + Sync + 'static, D: Scalar> Index<L, D> {
    /// Serializes the whole index (parameters, labels, every layer's
    /// adjacency, the free-id queue, and the entry point) to `writer`.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`] if bincode encoding fails; [`Error::Io`] if
    /// the write fails.
    pub fn save(&self, writer: &mut impl Write) -> Result<()>
    where
        L: Serialize,
    {
        let header = SnapshotHeader { magic: MAGIC, schema_version: SCHEMA_VERSION };
        bincode::serialize_into(&mut *writer, &header)?;

        let parts: ArenaParts<L> = self.arena().snapshot_parts();
        let body = SnapshotBody {
            params: *self.params(),
            entry_point: parts.entry_point,
            capacity: parts.capacity,
            labels: parts.labels,
            max_layers: parts.max_layers,
            out_edges: parts.out_edges,
            in_edges: parts.in_edges,
            free_ids: parts.free_ids,
        };
        bincode::serialize_into(writer, &body)?;
        Ok(())
    }

    /// Deserializes an index previously written by [`Index::save`].
    /// `distance` and `heuristic` are not part of the snapshot and must be
    /// supplied exactly as they were at the original [`Index::new`]/
    /// [`Index::with_heuristic`] call.
    ///
    /// # Errors
    ///
    /// [`Error::Corrupt`] if the magic number or schema version don't
    /// match; [`Error::Serialization`] if bincode decoding otherwise fails;
    /// [`Error::Io`] if the read fails.
    pub fn load(
        reader: &mut impl Read,
        distance: impl Fn(&L, &L) -> D + Send + Sync + 'static,
        heuristic: impl Heuristic<D> + 'static,
    ) -> Result<Self>
    where
        L: DeserializeOwned,
    {
        let header: SnapshotHeader = bincode::deserialize_from(&mut *reader)?;
        if header.magic != MAGIC {
            return Err(Error::Corrupt("bad magic number".into()));
        }
        if header.schema_version != SCHEMA_VERSION {
            return Err(Error::Corrupt(format!(
                "unsupported schema version {} (expected {SCHEMA_VERSION})",
                header.schema_version
            )));
        }

        let body: SnapshotBody<L> = bincode::deserialize_from(reader)?;
        body.params.validate()?;
        if body.params != IndexParams::default() {
            tracing::warn!(
                params = ?body.params,
                "loaded snapshot declares parameters that differ from IndexParams::default()"
            );
        }

        let parts = ArenaParts {
            capacity: body.capacity,
            entry_point: body.entry_point,
            labels: body.labels,
            max_layers: body.max_layers,
            out_edges: body.out_edges,
            in_edges: body.in_edges,
            free_ids: body.free_ids,
        };
        let params = body.params;
        let max_edges = move |l: usize| params.max_edges_for_layer(l);
        let arena: Arena<L> = Arena::restore(
            params.distribution_rate,
            params.zero_layer_guaranteed,
            params.random_seed,
            params.allow_removals,
            max_edges,
            parts,
        );

        Ok(Index::from_restored(params, arena, distance, heuristic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::heuristic::RelativeNeighborhood;
    use std::io::Cursor;

    fn metric(a: &Vec<f32>, b: &Vec<f32>) -> f32 {
        DistanceMetric::SquaredEuclidean.distance(a, b)
    }

    #[test]
    fn round_trip_preserves_query_results() {
        let idx: Index<Vec<f32>, f32> = Index::new(IndexParams::default().with_ef_construction(32), metric);
        for i in 0..60 {
            idx.add(vec![i as f32, (i * 3 % 17) as f32]).unwrap();
        }
        let query = vec![12.0, 5.0];
        let before = idx.knn(&query, 5).unwrap();

        let mut buf = Vec::new();
        idx.save(&mut buf).unwrap();

        let restored: Index<Vec<f32>, f32> =
            Index::load(&mut Cursor::new(buf), metric, RelativeNeighborhood).unwrap();
        let after = restored.knn(&query, 5).unwrap();

        assert_eq!(before.len(), after.len());
        let before_ids: Vec<_> = before.iter().map(|(id, _)| *id).collect();
        let after_ids: Vec<_> = after.iter().map(|(id, _)| *id).collect();
        assert_eq!(before_ids, after_ids);
        assert_eq!(restored.len(), idx.len());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = Vec::new();
        bincode::serialize_into(&mut buf, &SnapshotHeader { magic: 0xBAD, schema_version: SCHEMA_VERSION })
            .unwrap();
        let res: Result<Index<Vec<f32>, f32>> = Index::load(&mut Cursor::new(buf), metric, RelativeNeighborhood);
        assert!(matches!(res, Err(Error::Corrupt(_))));
    }

    #[test]
    fn future_schema_version_is_rejected() {
        let mut buf = Vec::new();
        bincode::serialize_into(&mut buf, &SnapshotHeader { magic: MAGIC, schema_version: SCHEMA_VERSION + 1 })
            .unwrap();
        let res: Result<Index<Vec<f32>, f32>> = Index::load(&mut Cursor::new(buf), metric, RelativeNeighborhood);
        assert!(matches!(res, Err(Error::Corrupt(_))));
    }
}
