use linfa::Float;
use ndarray::{s, Array2, ArrayBase, Data, Ix1, Ix2};

/// Computes differences between x and each element of y
/// resulting in a 2d array of shape (nrows(y), ncols(x));
/// *Panics* if x and y have not the same number of components
pub fn differences<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix1>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    assert!(x.len() == y.ncols());
    x.to_owned() - y
}

/// Appends the `calib` vector to every row of `x`
/// resulting in a 2d array of shape (nrows(x), ncols(x) + len(calib))
pub fn augment<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    calib: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Array2<F> {
    let p = x.ncols();
    let mut xt = Array2::zeros((x.nrows(), p + calib.len()));
    xt.slice_mut(s![.., ..p]).assign(x);
    xt.slice_mut(s![.., p..]).assign(calib);
    xt
}

/// Returns the row indices of negative diagonal entries of a square matrix
pub(crate) fn negative_diagonal<F: Float>(m: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<usize> {
    m.diag()
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < F::zero())
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_differences() {
        let x = array![-0.9486833];
        let y = array![
            [-1.26491106],
            [-0.63245553],
            [0.],
            [0.63245553],
            [1.26491106]
        ];
        assert_abs_diff_eq!(
            &array![
                [0.31622777],
                [-0.31622777],
                [-0.9486833],
                [-1.58113883],
                [-2.21359436],
            ],
            &differences(&x, &y),
            epsilon = 1e-6
        )
    }

    #[test]
    fn test_augment() {
        let x = array![[1., 2.], [3., 4.], [5., 6.]];
        let xt = augment(&x, &array![0.5, -1.]);
        assert_eq!(
            array![[1., 2., 0.5, -1.], [3., 4., 0.5, -1.], [5., 6., 0.5, -1.]],
            xt
        );
    }

    #[test]
    fn test_augment_without_calibration() {
        let x = array![[1.], [3.]];
        let xt = augment(&x, &ndarray::Array1::<f64>::zeros(0));
        assert_eq!(x, xt);
    }

    #[test]
    fn test_negative_diagonal() {
        let m = array![[1., -3.], [2., -1e-12]];
        assert_eq!(vec![1], negative_diagonal(&m));
    }
}
