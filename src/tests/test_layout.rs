use proptest::prelude::*;

use crate::{dtype::DType, ops, shape::contiguous_strides, tensor::Tensor};

/// A shape of one to four dims and a shuffled order over them
fn permuted_shape() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    prop::collection::vec(1usize..5, 1..=4).prop_flat_map(|shape| {
        let order = (0..shape.len()).collect::<Vec<_>>();
        (Just(shape), Just(order).prop_shuffle())
    })
}

/// Read `data` (row-major under `shape`) through `strides`, one element per logical index
fn logical(data: &[f32], shape: &[usize], strides: &[usize], base: usize) -> Vec<f32> {
    let n = shape.iter().product::<usize>();
    (0..n)
        .map(|flat| {
            let mut rem = flat;
            let mut offset = base;
            for (&size, &stride) in shape.iter().zip(strides).rev() {
                offset += (rem % size) * stride;
                rem /= size;
            }
            data[offset]
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Relayout of any permutation matches reading the source by logical index
    #[test]
    fn prop_permute_relayout((shape, order) in permuted_shape()) {
        let n = shape.iter().product::<usize>();
        let data = (0..n).map(|i| i as f32).collect::<Vec<_>>();
        let t = Tensor::from_slice(&shape, &data).unwrap().permute(&order).unwrap();

        let strides = contiguous_strides(&shape);
        let expected = logical(
            &data,
            t.shape(),
            &order.iter().map(|&d| strides[d]).collect::<Vec<_>>(),
            0,
        );
        let dense = Tensor::new(t.shape(), DType::F32).unwrap();
        ops::rearrange(&dense, &t).unwrap();
        prop_assert_eq!(dense.to_vec::<f32>().unwrap(), expected.clone());

        // Scattering back into a strided destination undoes the permutation
        let back = Tensor::new(&shape, DType::F32).unwrap().permute(&order).unwrap();
        ops::rearrange(&back, &dense).unwrap();
        prop_assert_eq!(back.to_vec::<f32>().unwrap(), expected);
    }

    /// A slice reads element `start + i` of the original along its dim
    #[test]
    fn prop_slice_offsets(
        (shape, order) in permuted_shape(),
        dim_seed in 0usize..4,
        start_seed in 0usize..5,
        len_seed in 0usize..5,
    ) {
        let n = shape.iter().product::<usize>();
        let data = (0..n).map(|i| i as f32).collect::<Vec<_>>();
        let t = Tensor::from_slice(&shape, &data).unwrap().permute(&order).unwrap();
        let dim = dim_seed % t.ndim();
        let size = t.shape()[dim];
        let start = start_seed % size;
        let end = start + len_seed % (size - start + 1);

        let s = t.slice(dim, start, end).unwrap();
        prop_assert!(s.shares_storage(&t));
        let base = start * t.strides()[dim];
        prop_assert_eq!(
            s.to_vec::<f32>().unwrap(),
            logical(&data, s.shape(), s.strides(), base)
        );
        prop_assert_eq!(s.contiguous().unwrap().to_vec::<f32>().unwrap(), s.to_vec::<f32>().unwrap());
    }

    /// view of a contiguous tensor reproduces its element stream under any factoring
    #[test]
    fn prop_view_round_trip(a in 1usize..6, b in 1usize..6, c in 1usize..6) {
        let data = (0..a * b * c).map(|i| i as f32 * 0.5).collect::<Vec<_>>();
        let t = Tensor::from_slice(&[a, b, c], &data).unwrap();
        for shape in [vec![a * b * c], vec![a, b * c], vec![a * b, c], vec![c, b, a]] {
            let v = t.view(&shape).unwrap();
            prop_assert!(v.shares_storage(&t));
            prop_assert_eq!(v.to_vec::<f32>().unwrap(), data.clone());
        }
    }

    /// Writes through the original are visible through a permuted view
    #[test]
    fn prop_views_see_writes((shape, order) in permuted_shape()) {
        let n = shape.iter().product::<usize>();
        let t = Tensor::new(&shape, DType::F32).unwrap();
        let p = t.permute(&order).unwrap();
        let data = (0..n).map(|i| i as f32 + 1.).collect::<Vec<_>>();
        t.load_slice(&data).unwrap();
        let strides = contiguous_strides(&shape);
        let permuted = order.iter().map(|&d| strides[d]).collect::<Vec<_>>();
        prop_assert_eq!(p.to_vec::<f32>().unwrap(), logical(&data, p.shape(), &permuted, 0));
    }
}
