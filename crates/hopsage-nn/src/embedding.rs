//! Vertex embedding tables for target / context roles.
//!
//! Skip-gram style encoders (LINE, DeepWalk, Node2Vec) look vertices up in two
//! roles. Whether both roles read one table or two is decided once, at
//! construction; callers always ask for a role and never hold aliases.

use hopsage_core::graph::VertexId;
use hopsage_core::ndarray::{Array2, ArrayD, Axis};
use hopsage_core::tensor::gather_rows;
use hopsage_core::{Error, Result};
use hopsage_sample::ContrastiveIds;
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

/// Whether target and context lookups share parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSharing {
    /// One table for both roles.
    Shared,
    /// Separate target and context tables.
    #[default]
    Independent,
}

/// Lookup role of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Target,
    Context,
}

/// Dense `[num_embeddings, dim]` table indexed by vertex ID.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    weights: Array2<f32>,
}

impl EmbeddingTable {
    /// Uniform init in `[-0.5 / dim, 0.5 / dim)`, reproducible from `rng`.
    pub fn random(num_embeddings: usize, dim: usize, rng: &mut XorShiftRng) -> Result<Self> {
        if num_embeddings == 0 || dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "embedding table needs positive size, got [{}, {}]",
                num_embeddings, dim
            )));
        }
        let bound = 0.5 / dim as f32;
        let dist = Uniform::new(-bound, bound);
        let weights = Array2::from_shape_simple_fn((num_embeddings, dim), || dist.sample(&mut *rng));
        Ok(Self { weights })
    }

    pub fn zeros(num_embeddings: usize, dim: usize) -> Self {
        Self {
            weights: Array2::zeros((num_embeddings, dim)),
        }
    }

    pub fn from_weights(weights: Array2<f32>) -> Self {
        Self { weights }
    }

    pub fn num_embeddings(&self) -> usize {
        self.weights.nrows()
    }

    pub fn dim(&self) -> usize {
        self.weights.ncols()
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut Array2<f32> {
        &mut self.weights
    }

    /// Rows for `ids`, shaped `ids.shape + [dim]`.
    pub fn lookup(&self, ids: &ArrayD<VertexId>) -> Result<ArrayD<f32>> {
        let rows = self.num_embeddings();
        let index: Vec<usize> = ids
            .iter()
            .map(|&id| match usize::try_from(id) {
                Ok(i) if i < rows => Ok(i),
                _ => Err(Error::Feature(format!("vertex {} outside embedding table of {} rows", id, rows))),
            })
            .collect::<Result<_>>()?;
        gather_rows(&self.weights, &index, ids.shape())
    }
}

/// Embedded target, context and negatives of a contrastive batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ContrastiveEmbeddings {
    /// `[N, 1, D]`
    pub target: ArrayD<f32>,
    /// `[N, 1, D]`
    pub context: ArrayD<f32>,
    /// `[N, negative_num, D]`
    pub negative: ArrayD<f32>,
}

impl ContrastiveEmbeddings {
    /// Dot-product logits: positives `[N, 1]`, negatives `[N, negative_num]`.
    pub fn logits(&self) -> (ArrayD<f32>, ArrayD<f32>) {
        let last = Axis(self.target.ndim() - 1);
        let positive = (&self.target * &self.context).sum_axis(last);
        let negative = (&self.target * &self.negative).sum_axis(last);
        (positive, negative)
    }
}

/// Target and context embeddings with a fixed sharing mode.
#[derive(Debug, Clone)]
pub struct RoleEmbeddings {
    target: EmbeddingTable,
    context: Option<EmbeddingTable>,
}

impl RoleEmbeddings {
    pub fn new(num_embeddings: usize, dim: usize, sharing: WeightSharing, seed: u64) -> Result<Self> {
        let mut rng = XorShiftRng::seed_from_u64(seed);
        let target = EmbeddingTable::random(num_embeddings, dim, &mut rng)?;
        // context tables start at zero, as in word2vec
        let context = match sharing {
            WeightSharing::Shared => None,
            WeightSharing::Independent => Some(EmbeddingTable::zeros(num_embeddings, dim)),
        };
        tracing::debug!(num_embeddings, dim, ?sharing, "initialized role embeddings");
        Ok(Self { target, context })
    }

    pub fn sharing(&self) -> WeightSharing {
        if self.context.is_some() {
            WeightSharing::Independent
        } else {
            WeightSharing::Shared
        }
    }

    pub fn table(&self, role: Role) -> &EmbeddingTable {
        match (role, &self.context) {
            (Role::Context, Some(context)) => context,
            _ => &self.target,
        }
    }

    pub fn table_mut(&mut self, role: Role) -> &mut EmbeddingTable {
        match (role, &mut self.context) {
            (Role::Context, Some(context)) => context,
            _ => &mut self.target,
        }
    }

    pub fn lookup(&self, role: Role, ids: &ArrayD<VertexId>) -> Result<ArrayD<f32>> {
        self.table(role).lookup(ids)
    }

    /// Targets read the target table; contexts and negatives the context table.
    pub fn embed(&self, ids: &ContrastiveIds) -> Result<ContrastiveEmbeddings> {
        Ok(ContrastiveEmbeddings {
            target: self.lookup(Role::Target, &ids.target.clone().into_dyn())?,
            context: self.lookup(Role::Context, &ids.context.clone().into_dyn())?,
            negative: self.lookup(Role::Context, &ids.negative.clone().into_dyn())?,
        })
    }
}
