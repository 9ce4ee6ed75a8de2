use crate::prelude::*;

pub mod activation;
pub mod embedding;
pub mod linear;
pub mod norm;
pub mod transformer;

/// A layer with weights, run eagerly against its input
pub trait Module<I> {
    type Output;
    fn forward(&self, input: I) -> Result<Self::Output>;
}

impl<X> Module<X> for () {
    type Output = X;
    fn forward(&self, input: X) -> Result<Self::Output> {
        Ok(input)
    }
}

macro_rules! tuple_impls {
    ([$($name:ident),+] [$($idx:tt),+], $last:ident, [$($rev_tail:ident),*]) => {
        impl<
            Input,
            $last:
            $(Module::<$rev_tail ::Output>, $rev_tail: )*
            Module<Input>
        > Module<Input> for ($($name,)+) {
            type Output = $last ::Output;

            /// Calls forward sequentially on each module in the tuple.
            fn forward(&self, x: Input) -> Result<Self::Output> {
                $(let x = self.$idx.forward(x)?;)+
                Ok(x)
            }
        }
    };
}

tuple_impls!([M1][0], M1, []);
tuple_impls!([M1, M2] [0, 1], M2, [M1]);
tuple_impls!([M1, M2, M3] [0, 1, 2], M3, [M2, M1]);
tuple_impls!([M1, M2, M3, M4] [0, 1, 2, 3], M4, [M3, M2, M1]);

/// Run a 2D kernel over `input` by folding every leading dim into one row dim.
/// Returns the folded `[rows, last]` view and the leading dims to restore afterwards.
pub(crate) fn fold_rows(input: &Tensor) -> Result<(Tensor, Vec<usize>)> {
    let Some((&last, leading)) = input.shape().split_last() else {
        return Err(Error::shape("fold_rows", "input must have at least one dim"));
    };
    let rows = leading.iter().product();
    Ok((input.reshape(&[rows, last])?, leading.to_vec()))
}

pub(crate) fn unfold_rows(output: Tensor, leading: &[usize]) -> Result<Tensor> {
    let mut shape = leading.to_vec();
    shape.push(output.shape()[1]);
    output.view(&shape)
}
