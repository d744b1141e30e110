//! Subject topic map.
//!
//! Each subject is summarized by the centroid of its members' vectors. The
//! pairwise distances between centroids give, for every subject, its closest
//! peers; those edges are exported as a flat CSV for graph visualization and
//! stored in `subject_edges` under the oracle version that produced them.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use ndarray::Array2;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::corpus::types::SubjectId;
use crate::corpus::RecordStore;
use crate::error::{Error, Result};
use crate::oracle::EmbeddingOracle;

pub const CSV_HEADER: &str = "source,target,weight,source_name,target_name";

/// Distances below this are treated as this when computing weights.
pub const MIN_WEIGHT_DISTANCE: f64 = 1e-3;
pub const MAX_WEIGHT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
}

impl std::str::FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            other => Err(Error::InvalidArgument(format!(
                "unknown distance metric {other:?} (expected cosine or euclidean)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Centroid {
    pub subject: SubjectId,
    pub vector: Vec<f32>,
    /// Members whose vectors went into the mean.
    pub members: usize,
}

/// Symmetric subject-by-subject distances. Row `i` belongs to `ids[i]`.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    pub ids: Vec<SubjectId>,
    pub values: Array2<f64>,
}

impl DistanceMatrix {
    pub fn index_of(&self, subject: SubjectId) -> Option<usize> {
        self.ids.iter().position(|id| *id == subject)
    }

    pub fn distance(&self, a: SubjectId, b: SubjectId) -> Option<f64> {
        Some(self.values[[self.index_of(a)?, self.index_of(b)?]])
    }
}

/// One of a subject's closest peers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedSubject {
    pub target: SubjectId,
    /// 1 for the closest peer.
    pub rank: usize,
    pub distance: f64,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectEdge {
    pub source: SubjectId,
    pub target: SubjectId,
    pub rank: usize,
    pub distance: f64,
    pub weight: u32,
    pub source_name: String,
    pub target_name: String,
}

pub struct SubjectAggregator {
    store: Arc<dyn RecordStore>,
    oracle: Arc<dyn EmbeddingOracle>,
}

impl SubjectAggregator {
    pub fn new(store: Arc<dyn RecordStore>, oracle: Arc<dyn EmbeddingOracle>) -> Self {
        Self { store, oracle }
    }

    /// Element-wise mean of the member vectors of `subject`.
    ///
    /// Members that were never embedded are skipped; a subject with no
    /// embedded member is `EmptySubject`.
    pub fn centroid(&self, subject: SubjectId) -> Result<Centroid> {
        let keys = self.store.list_keys_by_subject(subject)?;
        if keys.is_empty() {
            return Err(Error::EmptySubject(subject));
        }

        let mut sum: Vec<f64> = Vec::new();
        let mut members = 0usize;
        for key in keys {
            let vector = match self.oracle.vector_of(key) {
                Ok(v) => v,
                Err(Error::NotFound(_)) => {
                    tracing::warn!(%subject, %key, "member has no vector, skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if sum.is_empty() {
                sum = vec![0.0; vector.len()];
            } else if sum.len() != vector.len() {
                return Err(Error::InvalidArgument(format!(
                    "article {key} has {} dimensions, subject {subject} expects {}",
                    vector.len(),
                    sum.len()
                )));
            }
            for (acc, x) in sum.iter_mut().zip(&vector) {
                *acc += f64::from(*x);
            }
            members += 1;
        }

        if members == 0 {
            return Err(Error::EmptySubject(subject));
        }
        let vector = sum.into_iter().map(|x| (x / members as f64) as f32).collect();
        Ok(Centroid {
            subject,
            vector,
            members,
        })
    }

    /// Centroids of every subject with at least one embedded member, by subject id.
    pub fn centroids(&self) -> Result<Vec<Centroid>> {
        let mut out = Vec::new();
        for subject in self.store.list_subjects()? {
            match self.centroid(subject.id) {
                Ok(c) => out.push(c),
                Err(Error::EmptySubject(id)) => {
                    tracing::warn!(subject = %id, name = %subject.name, "subject has no embedded members, skipped");
                }
                Err(e) => return Err(e),
            }
        }
        out.sort_by_key(|c| c.subject);
        Ok(out)
    }

    /// Every subject's `k` closest peers, named.
    pub fn topic_edges(&self, k: usize, metric: DistanceMetric) -> Result<Vec<SubjectEdge>> {
        let names: HashMap<SubjectId, String> = self
            .store
            .list_subjects()?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();
        let centroids = self.centroids()?;
        let matrix = distance_matrix(&centroids, metric)?;

        let name_of = |id: SubjectId| names.get(&id).cloned().unwrap_or_default();
        let mut edges = Vec::with_capacity(matrix.ids.len() * k);
        for &source in &matrix.ids {
            for peer in top_k_neighbors(&matrix, source, k)? {
                edges.push(SubjectEdge {
                    source,
                    target: peer.target,
                    rank: peer.rank,
                    distance: peer.distance,
                    weight: peer.weight,
                    source_name: name_of(source),
                    target_name: name_of(peer.target),
                });
            }
        }
        tracing::info!(subjects = matrix.ids.len(), edges = edges.len(), ?metric, "topic edges computed");
        Ok(edges)
    }

    pub fn oracle_version(&self) -> Result<String> {
        self.oracle.version()
    }
}

/// Pairwise distances between centroids: symmetric with a zero diagonal.
pub fn distance_matrix(centroids: &[Centroid], metric: DistanceMetric) -> Result<DistanceMatrix> {
    if let Some(first) = centroids.first() {
        if let Some(bad) = centroids.iter().find(|c| c.vector.len() != first.vector.len()) {
            return Err(Error::InvalidArgument(format!(
                "centroid of subject {} has {} dimensions, expected {}",
                bad.subject,
                bad.vector.len(),
                first.vector.len()
            )));
        }
    }

    let norms: Vec<f64> = centroids.iter().map(|c| norm(&c.vector)).collect();
    if metric == DistanceMetric::Cosine {
        if let Some((c, _)) = centroids.iter().zip(&norms).find(|(_, n)| **n == 0.0) {
            return Err(Error::DegenerateVector(c.subject));
        }
    }

    let n = centroids.len();
    let mut values = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (&centroids[i].vector, &centroids[j].vector);
            let d = match metric {
                DistanceMetric::Cosine => (1.0 - dot(a, b) / (norms[i] * norms[j])).max(0.0),
                DistanceMetric::Euclidean => a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (f64::from(*x) - f64::from(*y)).powi(2))
                    .sum::<f64>()
                    .sqrt(),
            };
            values[[i, j]] = d;
            values[[j, i]] = d;
        }
    }

    Ok(DistanceMatrix {
        ids: centroids.iter().map(|c| c.subject).collect(),
        values,
    })
}

/// The `k` subjects closest to `subject`, excluding itself.
///
/// Ordered by ascending distance, ties by ascending subject id.
pub fn top_k_neighbors(
    matrix: &DistanceMatrix,
    subject: SubjectId,
    k: usize,
) -> Result<Vec<RankedSubject>> {
    let row = matrix
        .index_of(subject)
        .ok_or_else(|| Error::NotFound(format!("subject {subject} not in distance matrix")))?;

    let mut peers: Vec<(SubjectId, f64)> = matrix
        .ids
        .iter()
        .enumerate()
        .filter(|(_, id)| **id != subject)
        .map(|(col, id)| (*id, matrix.values[[row, col]]))
        .collect();
    peers.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    peers.truncate(k);

    Ok(peers
        .into_iter()
        .enumerate()
        .map(|(i, (target, distance))| RankedSubject {
            target,
            rank: i + 1,
            distance,
            weight: reciprocal_weight(distance),
        })
        .collect())
}

/// `round(1 / d)`, with `d` floored at [`MIN_WEIGHT_DISTANCE`] and the
/// result kept within `1..=MAX_WEIGHT`.
pub fn reciprocal_weight(distance: f64) -> u32 {
    let w = (1.0 / distance.max(MIN_WEIGHT_DISTANCE)).round();
    (w as u32).clamp(1, MAX_WEIGHT)
}

pub fn write_edges_csv<W: Write>(mut out: W, edges: &[SubjectEdge]) -> std::io::Result<()> {
    writeln!(out, "{CSV_HEADER}")?;
    for e in edges {
        writeln!(
            out,
            "{},{},{},{},{}",
            e.source,
            e.target,
            e.weight,
            csv_field(&e.source_name),
            csv_field(&e.target_name)
        )?;
    }
    out.flush()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Replace the stored edges for `oracle_version`. Returns rows written.
pub fn save_subject_edges(
    conn: &mut Connection,
    oracle_version: &str,
    edges: &[SubjectEdge],
) -> Result<usize> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM subject_edges WHERE oracle_version = ?1",
        params![oracle_version],
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO subject_edges (oracle_version, source_id, target_id, rank, distance, weight)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for e in edges {
            stmt.execute(params![
                oracle_version,
                e.source.0,
                e.target.0,
                e.rank as i64,
                e.distance,
                e.weight
            ])?;
        }
    }
    tx.commit()?;
    Ok(edges.len())
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

fn norm(v: &[f32]) -> f64 {
    dot(v, v).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centroid(id: i64, vector: Vec<f32>) -> Centroid {
        Centroid {
            subject: SubjectId(id),
            vector,
            members: 1,
        }
    }

    #[test]
    fn orthogonal_unit_centroids_are_distance_one_weight_one() {
        let m = distance_matrix(
            &[centroid(1, vec![1.0, 0.0]), centroid(2, vec![0.0, 1.0])],
            DistanceMetric::Cosine,
        )
        .unwrap();
        assert!((m.distance(SubjectId(1), SubjectId(2)).unwrap() - 1.0).abs() < 1e-12);

        let top = top_k_neighbors(&m, SubjectId(1), 5).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].target, SubjectId(2));
        assert_eq!(top[0].weight, 1);
    }

    #[test]
    fn matrix_is_symmetric_with_zero_diagonal() {
        let cs = vec![
            centroid(1, vec![1.0, 0.0, 0.0]),
            centroid(2, vec![0.6, 0.8, 0.0]),
            centroid(3, vec![0.0, 0.3, 0.9]),
        ];
        for metric in [DistanceMetric::Cosine, DistanceMetric::Euclidean] {
            let m = distance_matrix(&cs, metric).unwrap();
            for i in 0..3 {
                assert_eq!(m.values[[i, i]], 0.0);
                for j in 0..3 {
                    assert_eq!(m.values[[i, j]], m.values[[j, i]]);
                }
            }
        }
    }

    #[test]
    fn cosine_over_zero_vector_is_degenerate() {
        let err = distance_matrix(
            &[centroid(1, vec![1.0, 0.0]), centroid(7, vec![0.0, 0.0])],
            DistanceMetric::Cosine,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DegenerateVector(SubjectId(7))));
    }

    #[test]
    fn euclidean_accepts_zero_vector() {
        let m = distance_matrix(
            &[centroid(1, vec![3.0, 4.0]), centroid(2, vec![0.0, 0.0])],
            DistanceMetric::Euclidean,
        )
        .unwrap();
        assert!((m.distance(SubjectId(1), SubjectId(2)).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn top_k_excludes_self_even_when_identical() {
        // Subjects 1 and 2 share a centroid; 1 must still not list itself.
        let m = distance_matrix(
            &[
                centroid(1, vec![1.0, 0.0]),
                centroid(2, vec![1.0, 0.0]),
                centroid(3, vec![0.0, 1.0]),
            ],
            DistanceMetric::Cosine,
        )
        .unwrap();
        let top = top_k_neighbors(&m, SubjectId(1), 2).unwrap();
        let targets: Vec<_> = top.iter().map(|r| r.target).collect();
        assert_eq!(targets, vec![SubjectId(2), SubjectId(3)]);
        assert_eq!(top[0].weight, MAX_WEIGHT);
        assert_eq!(top[0].rank, 1);
    }

    #[test]
    fn ties_break_by_subject_id() {
        let m = distance_matrix(
            &[
                centroid(1, vec![1.0, 0.0, 0.0]),
                centroid(9, vec![0.0, 0.0, 1.0]),
                centroid(4, vec![0.0, 1.0, 0.0]),
            ],
            DistanceMetric::Cosine,
        )
        .unwrap();
        let top = top_k_neighbors(&m, SubjectId(1), 2).unwrap();
        assert_eq!(top[0].target, SubjectId(4));
        assert_eq!(top[1].target, SubjectId(9));
    }

    #[test]
    fn unknown_subject_is_not_found() {
        let m = distance_matrix(&[centroid(1, vec![1.0])], DistanceMetric::Euclidean).unwrap();
        assert!(matches!(
            top_k_neighbors(&m, SubjectId(2), 3),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn weight_is_reciprocal_and_clamped() {
        assert_eq!(reciprocal_weight(0.25), 4);
        assert_eq!(reciprocal_weight(0.0), MAX_WEIGHT);
        assert_eq!(reciprocal_weight(1.7), 1);
        assert_eq!(reciprocal_weight(0.4), 3);
    }

    #[test]
    fn metric_parses_case_insensitively() {
        assert_eq!("Euclidean".parse::<DistanceMetric>().unwrap(), DistanceMetric::Euclidean);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn csv_has_header_and_quotes_names() {
        let edges = vec![SubjectEdge {
            source: SubjectId(1),
            target: SubjectId(2),
            rank: 1,
            distance: 0.5,
            weight: 2,
            source_name: "cs.IR".into(),
            target_name: "Math, \"general\"".into(),
        }];
        let mut buf = Vec::new();
        write_edges_csv(&mut buf, &edges).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "source,target,weight,source_name,target_name\n1,2,2,cs.IR,\"Math, \"\"general\"\"\"\n"
        );
    }

    #[test]
    fn saving_edges_replaces_prior_set() {
        let mut conn = crate::db::open_memory_database().unwrap();
        conn.execute_batch("INSERT INTO subjects (id, name) VALUES (1,'a'),(2,'b'),(3,'c'),(4,'d')")
            .unwrap();
        let edge = |t: i64| SubjectEdge {
            source: SubjectId(1),
            target: SubjectId(t),
            rank: 1,
            distance: 0.5,
            weight: 2,
            source_name: "a".into(),
            target_name: "b".into(),
        };
        save_subject_edges(&mut conn, "m@1", &[edge(2), edge(3)]).unwrap();
        save_subject_edges(&mut conn, "m@1", &[edge(4)]).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM subject_edges WHERE oracle_version = 'm@1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }
}
