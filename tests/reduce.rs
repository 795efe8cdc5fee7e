use ferroblas::*;

#[test]
fn reduce_empty_vector_yields_identity() -> anyhow::Result<()> {
    // Scenario S5: an empty 8-vector under the max monoid reduces to the
    // smallest representable value.
    let v = Vector::<f64>::new(8)?;
    assert_eq!(v.reduce(&ops::max_monoid::<f64>())?, f64::MIN);

    let w = Vector::<i32>::new(8)?;
    assert_eq!(w.reduce(&ops::max_monoid::<i32>())?, i32::MIN);
    Ok(())
}

#[test]
fn reduce_vector_under_plus_and_max() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(100)?;
    let idx: Vec<Ix> = (0..100).step_by(3).collect();
    let val: Vec<i64> = idx.iter().map(|i| i * 2).collect();
    v.build(&idx, &val, None)?;

    assert_eq!(v.reduce(&ops::plus_monoid::<i64>())?, val.iter().sum::<i64>());
    assert_eq!(v.reduce(&ops::max_monoid::<i64>())?, 198);
    Ok(())
}

#[test]
fn reduce_matrix_to_scalar() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(4, 4)?;
    a.build(&[0, 1, 3], &[2, 1, 0], &[5, -2, 9], None)?;
    assert_eq!(a.reduce(&ops::plus_monoid::<i64>())?, 12);
    assert_eq!(a.reduce(&ops::min_monoid::<i64>())?, -2);

    let empty = Matrix::<i64>::new(4, 4)?;
    assert_eq!(empty.reduce(&ops::plus_monoid::<i64>())?, 0);
    Ok(())
}

#[test]
fn reduce_rows_produces_a_vector() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(4, 3)?;
    a.build(
        &[0, 0, 2, 2, 2],
        &[0, 2, 0, 1, 2],
        &[1, 2, 3, 4, 5],
        None,
    )?;

    let mut w = Vector::<i64>::new(4)?;
    w.reduce_rows(None, None, &ops::plus_monoid::<i64>(), &a, Descriptor::new())?;
    let (idx, val) = w.extract_tuples()?;
    // Rows 1 and 3 are empty: no entries for them.
    assert_eq!(idx, vec![0, 2]);
    assert_eq!(val, vec![3, 12]);
    Ok(())
}

#[test]
fn reduce_cols_via_transpose_descriptor() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(2, 3)?;
    a.build(&[0, 0, 1], &[0, 2, 2], &[1, 2, 3], None)?;

    let mut w = Vector::<i64>::new(3)?;
    w.reduce_rows(
        None,
        None,
        &ops::plus_monoid::<i64>(),
        &a,
        Descriptor::new().with_transpose0(),
    )?;
    let (idx, val) = w.extract_tuples()?;
    assert_eq!(idx, vec![0, 2]);
    assert_eq!(val, vec![1, 5]);
    Ok(())
}

#[test]
fn masked_row_reduction() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(3, 3)?;
    a.build(&[0, 1, 2], &[0, 1, 2], &[1, 2, 3], None)?;

    let mut m = Vector::<bool>::new(3)?;
    m.build(&[0, 2], &[true, true], None)?;

    let mut w = Vector::<i64>::new(3)?;
    w.reduce_rows(
        Some(&m.as_structure()),
        None,
        &ops::plus_monoid::<i64>(),
        &a,
        Descriptor::new().with_replace(),
    )?;
    let (idx, val) = w.extract_tuples()?;
    assert_eq!(idx, vec![0, 2]);
    assert_eq!(val, vec![1, 3]);
    Ok(())
}

#[test]
fn scalar_reduction_is_deferred_and_accumulates() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(5)?;
    v.build(&[0, 4], &[3, 4], None)?;

    let mut s = Scalar::from_value(100);
    s.reduce_vector(Some(&ops::plus::<i64>()), &ops::plus_monoid::<i64>(), &v)?;
    assert_eq!(s.extract_element()?, 107);

    // Without an accumulator the reduction replaces the prior value.
    let mut t = Scalar::from_value(100);
    t.reduce_vector(None, &ops::plus_monoid::<i64>(), &v)?;
    assert_eq!(t.extract_element()?, 7);

    // Reducing an empty container still yields the identity.
    let empty = Vector::<i64>::new(5)?;
    let mut u = Scalar::<i64>::new();
    u.reduce_vector(None, &ops::plus_monoid::<i64>(), &empty)?;
    assert_eq!(u.extract_element()?, 0);
    Ok(())
}

#[test]
fn scalar_matrix_reduction() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(3, 3)?;
    a.build(&[0, 2], &[1, 2], &[4, 6], None)?;
    let mut s = Scalar::<i64>::new();
    s.reduce_matrix(None, &ops::plus_monoid::<i64>(), &a)?;
    assert_eq!(s.extract_element()?, 10);
    Ok(())
}
