use tracing::debug;

use crate::{nn::linear::Linear, ops, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttentionConfig {
    pub n_heads: usize,
    pub n_kv_heads: usize,
    pub head_dim: usize,
    pub rope_theta: f32,
}

impl AttentionConfig {
    /// Query heads per kv head, `None` when the heads don't split evenly
    pub fn group_size(&self) -> Option<usize> {
        match self.n_heads.checked_rem(self.n_kv_heads) {
            Some(0) => Some(self.n_heads / self.n_kv_heads),
            _ => None,
        }
    }
}

/// Keys and values of every position seen so far, preallocated to `max_len` positions
#[derive(Debug)]
pub struct KvCache {
    keys: Tensor,
    values: Tensor,
    len: usize,
}

impl KvCache {
    pub fn new(config: &AttentionConfig, max_len: usize, dtype: DType, device: Device) -> Result<Self> {
        let shape = [max_len, config.n_kv_heads, config.head_dim];
        Ok(Self {
            keys: Tensor::new_on(&shape, dtype, device)?,
            values: Tensor::new_on(&shape, dtype, device)?,
            len: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.keys.shape()[0]
    }

    /// Copy `[seqlen, n_kv_heads, head_dim]` keys and values in after the cached positions,
    /// then return views over every position cached so far.
    pub fn append(&mut self, keys: &Tensor, values: &Tensor) -> Result<(Tensor, Tensor)> {
        let seqlen = keys.shape().first().copied().unwrap_or(0);
        let end = self.len + seqlen;
        if end > self.capacity() {
            return Err(Error::shape(
                "kv_cache",
                format!(
                    "{seqlen} new positions overflow a cache of {} holding {}",
                    self.capacity(),
                    self.len
                ),
            ));
        }
        ops::rearrange(&self.keys.slice(0, self.len, end)?, keys)?;
        ops::rearrange(&self.values.slice(0, self.len, end)?, values)?;
        self.len = end;
        Ok((self.keys.slice(0, 0, end)?, self.values.slice(0, 0, end)?))
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Grouped-query self attention with rotary positions
#[derive(Debug, Clone)]
pub struct SelfAttention {
    pub q_proj: Linear,
    pub k_proj: Linear,
    pub v_proj: Linear,
    pub o_proj: Linear,
    pub config: AttentionConfig,
}

impl SelfAttention {
    pub fn new(
        q_proj: Linear,
        k_proj: Linear,
        v_proj: Linear,
        o_proj: Linear,
        config: AttentionConfig,
    ) -> Result<Self> {
        let AttentionConfig {
            n_heads,
            n_kv_heads,
            head_dim,
            ..
        } = config;
        if config.group_size().is_none() {
            return Err(Error::shape(
                "attention",
                format!("{n_heads} heads cannot share {n_kv_heads} kv heads"),
            ));
        }
        let expected = [
            ("q_proj", &q_proj, n_heads * head_dim),
            ("k_proj", &k_proj, n_kv_heads * head_dim),
            ("v_proj", &v_proj, n_kv_heads * head_dim),
        ];
        for (name, proj, features) in expected {
            if proj.out_features() != features {
                return Err(Error::shape(
                    "attention",
                    format!(
                        "{name} projects to {} features, expected {features}",
                        proj.out_features()
                    ),
                ));
            }
        }
        if o_proj.in_features() != n_heads * head_dim {
            return Err(Error::shape(
                "attention",
                format!(
                    "o_proj takes {} features, expected {}",
                    o_proj.in_features(),
                    n_heads * head_dim
                ),
            ));
        }
        Ok(Self {
            q_proj,
            k_proj,
            v_proj,
            o_proj,
            config,
        })
    }

    fn project(&self, proj: &Linear, x: &Tensor, heads: usize) -> Result<Tensor> {
        let seqlen = x.shape()[0];
        proj.forward(x.clone())?
            .view(&[seqlen, heads, self.config.head_dim])
    }
}

/// `[seqlen, hidden]` inputs at positions `cache.len()..`, appended to the cache
impl<'a> Module<(Tensor, &'a mut KvCache)> for SelfAttention {
    type Output = Tensor;

    fn forward(&self, (x, cache): (Tensor, &'a mut KvCache)) -> Result<Tensor> {
        let AttentionConfig {
            n_heads,
            n_kv_heads,
            head_dim,
            rope_theta,
        } = self.config;
        if x.ndim() != 2 {
            return Err(Error::shape(
                "attention",
                format!("input must be [seqlen, hidden], got {:?}", x.shape()),
            ));
        }
        let seqlen = x.shape()[0];
        let start = cache.len();
        debug!(start, seqlen, "attention step");

        let q = self.project(&self.q_proj, &x, n_heads)?;
        let k = self.project(&self.k_proj, &x, n_kv_heads)?;
        let v = self.project(&self.v_proj, &x, n_kv_heads)?;

        let positions = (start..start + seqlen).map(|p| p as i64).collect::<Vec<_>>();
        let pos = Tensor::from_slice(&[seqlen], &positions)?.to(x.device())?;
        ops::rope(&q, &q, &pos, rope_theta)?;
        ops::rope(&k, &k, &pos, rope_theta)?;

        let (keys, values) = cache.append(&k, &v)?;
        let attn = Tensor::new_on(&[seqlen, n_heads, head_dim], x.dtype(), x.device())?;
        ops::self_attention(&attn, &q, &keys, &values, 1.0 / (head_dim as f32).sqrt())?;
        self.o_proj.forward(attn.view(&[seqlen, n_heads * head_dim])?)
    }
}

/// A whole sequence with no history
impl Module<Tensor> for SelfAttention {
    type Output = Tensor;

    fn forward(&self, x: Tensor) -> Result<Tensor> {
        let seqlen = x.shape().first().copied().unwrap_or(0);
        let mut cache = KvCache::new(&self.config, seqlen, x.dtype(), x.device())?;
        self.forward((x, &mut cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{assert_close, random_vec};

    const CONFIG: AttentionConfig = AttentionConfig {
        n_heads: 4,
        n_kv_heads: 2,
        head_dim: 4,
        rope_theta: 10000.,
    };
    const HIDDEN: usize = 8;

    fn random_linear(out: usize, inp: usize) -> Linear {
        Linear::new(Tensor::from_slice(&[out, inp], &random_vec(out * inp)).unwrap(), None).unwrap()
    }

    fn model() -> SelfAttention {
        let (q, kv) = (CONFIG.n_heads * CONFIG.head_dim, CONFIG.n_kv_heads * CONFIG.head_dim);
        SelfAttention::new(
            random_linear(q, HIDDEN),
            random_linear(kv, HIDDEN),
            random_linear(kv, HIDDEN),
            random_linear(HIDDEN, q),
            CONFIG,
        )
        .unwrap()
    }

    #[test]
    fn test_incremental_matches_full_sequence() {
        let model = model();
        let x = random_vec(5 * HIDDEN);
        let input = Tensor::from_slice(&[5, HIDDEN], &x).unwrap();
        let full = model.forward(input.clone()).unwrap();
        assert_eq!(full.shape(), &[5, HIDDEN]);

        // Prefill three positions, then decode the rest one at a time
        let mut cache = KvCache::new(&CONFIG, 8, DType::F32, Device::Cpu).unwrap();
        let mut rows = model
            .forward((input.slice(0, 0, 3).unwrap(), &mut cache))
            .unwrap()
            .to_vec::<f32>()
            .unwrap();
        for p in 3..5 {
            let step = model
                .forward((input.slice(0, p, p + 1).unwrap(), &mut cache))
                .unwrap();
            rows.extend(step.to_vec::<f32>().unwrap());
        }
        assert_eq!(cache.len(), 5);
        assert_close(&rows, &full.to_vec::<f32>().unwrap());
    }

    #[test]
    fn test_first_position_copies_its_value() {
        // A single position attends only to itself, so attention returns its own value
        let eye = |n: usize| {
            let mut data = vec![0f32; n * n];
            (0..n).for_each(|i| data[i * n + i] = 1.);
            Linear::new(Tensor::from_slice(&[n, n], &data).unwrap(), None).unwrap()
        };
        let config = AttentionConfig {
            n_heads: 2,
            n_kv_heads: 1,
            head_dim: 2,
            rope_theta: 10000.,
        };
        let v = Linear::new(
            Tensor::from_slice(&[2, 4], &[1f32, 0., 0., 0., 0., 1., 0., 0.]).unwrap(),
            None,
        )
        .unwrap();
        let k = v.clone();
        let model = SelfAttention::new(eye(4), k, v, eye(4), config).unwrap();
        let out = model
            .forward(Tensor::from_slice(&[1, 4], &[3f32, -2., 9., 9.]).unwrap())
            .unwrap();
        // Both query heads read the single kv head
        assert_close(&out.to_vec::<f32>().unwrap(), &[3., -2., 3., -2.]);
    }

    #[test]
    fn test_cache_overflow() {
        let model = model();
        let mut cache = KvCache::new(&CONFIG, 2, DType::F32, Device::Cpu).unwrap();
        let input = Tensor::from_slice(&[3, HIDDEN], &random_vec(3 * HIDDEN)).unwrap();
        assert!(matches!(
            model.forward((input, &mut cache)),
            Err(Error::Shape { op: "kv_cache", .. })
        ));
        assert!(cache.is_empty());
        cache.clear();
    }

    #[test]
    fn test_config_checks() {
        let bad = AttentionConfig {
            n_kv_heads: 3,
            ..CONFIG
        };
        let q = CONFIG.n_heads * CONFIG.head_dim;
        let kv = CONFIG.n_kv_heads * CONFIG.head_dim;
        assert!(SelfAttention::new(
            random_linear(q, HIDDEN),
            random_linear(kv, HIDDEN),
            random_linear(kv, HIDDEN),
            random_linear(HIDDEN, q),
            bad,
        )
        .is_err());
        assert!(SelfAttention::new(
            random_linear(q, HIDDEN),
            random_linear(q, HIDDEN),
            random_linear(kv, HIDDEN),
            random_linear(HIDDEN, q),
            CONFIG,
        )
        .is_err());
        assert_eq!(CONFIG.group_size(), Some(2));
        let no_kv = AttentionConfig {
            n_kv_heads: 0,
            ..CONFIG
        };
        assert_eq!(no_kv.group_size(), None);
        let uneven = AttentionConfig {
            n_kv_heads: 3,
            ..CONFIG
        };
        assert_eq!(uneven.group_size(), None);
    }
}
