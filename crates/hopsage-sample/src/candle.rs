//! Structured batches as named `candle` tensors.

use crate::pipeline::Structured;
use candle_core::{Device, Tensor};
use hopsage_core::backend::candle::to_tensor;
use hopsage_core::Result;

/// Convert every tensor of `batch` to `device`, in [`Structured::fields`] order.
pub fn to_tensors(batch: &Structured, device: &Device) -> Result<Vec<(String, Tensor)>> {
    let mut out = Vec::new();
    match batch {
        Structured::Bipartite(layers) => {
            for (i, layer) in layers.iter().enumerate() {
                let name = |field: &str| format!("layer{}.{}", i, field);
                out.push((name("src"), to_tensor(&layer.src, device)?));
                out.push((name("dst"), to_tensor(&layer.dst, device)?));
                if let (Some(s), Some(d)) = (&layer.src_dense, &layer.dst_dense) {
                    out.push((name("src_dense"), to_tensor(s, device)?));
                    out.push((name("dst_dense"), to_tensor(d, device)?));
                }
                if let (Some(s), Some(d)) = (&layer.src_sparse, &layer.dst_sparse) {
                    out.push((name("src_sparse"), to_tensor(s, device)?));
                    out.push((name("dst_sparse"), to_tensor(d, device)?));
                }
                if let Some(w) = &layer.edge_weight {
                    out.push((name("edge_weight"), to_tensor(w, device)?));
                }
            }
        }
        Structured::Relation(batch) => {
            let g = &batch.graph;
            out.push(("ids".into(), to_tensor(&g.unique_ids.clone().into_dyn(), device)?));
            out.push((
                "relation_indices".into(),
                to_tensor(&g.relation_indices.clone().into_dyn(), device)?,
            ));
            if let Some(w) = &g.relation_weight {
                out.push(("relation_weight".into(), to_tensor(&w.clone().into_dyn(), device)?));
            }
            out.push(("target_indices".into(), to_tensor(&g.target_indices, device)?));
            if let Some(d) = &batch.dense {
                out.push(("dense".into(), to_tensor(&d.clone().into_dyn(), device)?));
            }
            if let Some(s) = &batch.sparse {
                out.push(("sparse".into(), to_tensor(&s.clone().into_dyn(), device)?));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SamplingPipeline;
    use hopsage_core::{Encoding, InMemoryGraph, MultiHopConfig, PipelineConfig, RelationOptions};

    #[test]
    fn test_tensors_follow_field_order() {
        let mut g = InMemoryGraph::new(3);
        for v in 0..6 {
            g.add_undirected_edge(v, (v + 1) % 6, 0, 1.0);
        }
        let config = PipelineConfig::new(MultiHopConfig::new(vec![vec![0]], vec![3]))
            .with_encoding(Encoding::Relation(RelationOptions::default()));
        let batch = SamplingPipeline::new(&config).unwrap().run_ids(&mut g, &[0, 3]).unwrap();
        let tensors = to_tensors(&batch, &Device::Cpu).unwrap();
        let names: Vec<String> = tensors.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, batch.fields());
        assert_eq!(tensors[1].1.dims(), &[2, 6]);
    }
}
