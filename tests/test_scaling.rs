use assert_approx_eq::assert_approx_eq;
use forecast_air::scaling::{MinMaxScaler, ScalerPair};
use ndarray::array;

#[test]
fn test_transform_maps_fitted_range_onto_unit_interval() {
    let m = array![[10.0, 100.0], [20.0, 300.0], [15.0, 200.0]];
    let scaler = MinMaxScaler::fit(&m).unwrap();
    let t = scaler.transform(&m).unwrap();

    assert_approx_eq!(t[[0, 0]], 0.0);
    assert_approx_eq!(t[[1, 0]], 1.0);
    assert_approx_eq!(t[[2, 0]], 0.5);
    assert_approx_eq!(t[[2, 1]], 0.5);
}

#[test]
fn test_round_trip_within_fitted_domain() {
    let m = array![
        [30.0, 8.0, 1.2, 40.0, 12.0],
        [32.0, 9.0, 1.1, 41.0, 13.0],
        [28.0, 7.5, 1.4, 39.0, 11.0]
    ];
    let scaler = MinMaxScaler::fit(&m).unwrap();
    let back = scaler.inverse_transform(&scaler.transform(&m).unwrap()).unwrap();

    for (a, b) in m.iter().zip(back.iter()) {
        assert_approx_eq!(a, b, 1e-12);
    }
}

#[test]
fn test_out_of_range_values_extrapolate_without_clipping() {
    // Future readings are not bounded by training-time extrema; the
    // scaler extends the line instead of clamping
    let m = array![[0.0], [10.0]];
    let scaler = MinMaxScaler::fit(&m).unwrap();

    let t = scaler.transform(&array![[20.0], [-5.0]]).unwrap();
    assert_approx_eq!(t[[0, 0]], 2.0);
    assert_approx_eq!(t[[1, 0]], -0.5);

    let back = scaler.inverse_transform(&t).unwrap();
    assert_approx_eq!(back[[0, 0]], 20.0);
    assert_approx_eq!(back[[1, 0]], -5.0);
}

#[test]
fn test_constant_column_round_trips() {
    let m = array![[5.0], [5.0], [5.0]];
    let scaler = MinMaxScaler::fit(&m).unwrap();

    let t = scaler.transform(&m).unwrap();
    assert_approx_eq!(t[[0, 0]], 0.0);

    let back = scaler.inverse_transform(&t).unwrap();
    assert_approx_eq!(back[[0, 0]], 5.0);
}

#[test]
fn test_fit_rejects_empty_and_nan_input() {
    let empty = ndarray::Array2::<f64>::zeros((0, 3));
    assert!(MinMaxScaler::fit(&empty).is_err());

    let with_nan = array![[1.0, f64::NAN], [2.0, 3.0]];
    assert!(MinMaxScaler::fit(&with_nan).is_err());
}

#[test]
fn test_transform_rejects_width_mismatch() {
    let scaler = MinMaxScaler::fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
    assert!(scaler.transform(&array![[1.0], [2.0]]).is_err());
}

#[test]
fn test_scaler_pair_serde_round_trip() {
    let x = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
    let y = array![[0.5], [1.5]];
    let pair = ScalerPair::fit(&x, &y).unwrap();

    let json = serde_json::to_string(&pair).unwrap();
    let restored: ScalerPair = serde_json::from_str(&json).unwrap();
    assert_eq!(pair, restored);
}
