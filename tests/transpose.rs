use ferroblas::*;

#[test]
fn transpose_is_a_view_not_a_copy() -> anyhow::Result<()> {
    // Scenario S4: a single entry at (2,3) shows up at (3,2) without any
    // materialization of the source.
    let mut a = Matrix::<f64>::new(5, 5)?;
    a.build(&[2], &[3], &[7.5], None)?;

    let mut t = Matrix::<f64>::new(5, 5)?;
    t.transpose(None, None, &a, Descriptor::new())?;

    assert_eq!(t.extract_element(3, 2)?, 7.5);
    assert!(matches!(t.extract_element(2, 3), Err(Error::NoValue)));
    assert_eq!(t.nvals()?, 1);
    Ok(())
}

#[test]
fn transpose_involution() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(3, 4)?;
    a.build(&[0, 1, 2, 2], &[3, 0, 1, 2], &[1, 2, 3, 4], None)?;

    let mut t = Matrix::<i64>::new(4, 3)?;
    t.transpose(None, None, &a, Descriptor::new())?;
    let mut tt = Matrix::<i64>::new(3, 4)?;
    tt.transpose(None, None, &t, Descriptor::new())?;

    assert_eq!(a.extract_tuples()?, tt.extract_tuples()?);
    Ok(())
}

#[test]
fn transpose_of_transposed_input_is_identity() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(2, 3)?;
    a.build(&[0, 1], &[2, 0], &[5, 6], None)?;

    // C = (Aᵀ)ᵀ = A.
    let mut c = Matrix::<i64>::new(2, 3)?;
    c.transpose(None, None, &a, Descriptor::new().with_transpose0())?;
    assert_eq!(a.extract_tuples()?, c.extract_tuples()?);
    Ok(())
}

#[test]
fn transpose_with_accum_merges_into_prior() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(2, 2)?;
    a.build(&[0], &[1], &[10], None)?;

    let mut c = Matrix::<i64>::new(2, 2)?;
    c.build(&[1], &[0], &[1], None)?;
    c.transpose(None, Some(&ops::plus::<i64>()), &a, Descriptor::new())?;

    let (r, cc, v) = c.extract_tuples()?;
    assert_eq!(r, vec![1]);
    assert_eq!(cc, vec![0]);
    assert_eq!(v, vec![11]);
    Ok(())
}

#[test]
fn transposed_view_streams_row_major() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(3, 3)?;
    a.build(&[0, 0, 1, 2], &[1, 2, 0, 1], &[1, 2, 3, 4], None)?;

    let mut t = Matrix::<i64>::new(3, 3)?;
    t.transpose(None, None, &a, Descriptor::new())?;

    let (r, c, v) = t.extract_tuples()?;
    assert_eq!(r, vec![0, 1, 1, 2]);
    assert_eq!(c, vec![1, 0, 2, 0]);
    assert_eq!(v, vec![3, 1, 4, 2]);
    Ok(())
}

#[test]
fn diag_views_a_vector() -> anyhow::Result<()> {
    let mut v = Vector::<i64>::new(3)?;
    v.build(&[0, 2], &[5, 7], None)?;

    let d = Matrix::diag(&v, 0);
    assert_eq!((d.nrows(), d.ncols()), (3, 3));
    assert_eq!(d.extract_element(0, 0)?, 5);
    assert_eq!(d.extract_element(2, 2)?, 7);
    assert!(matches!(d.extract_element(1, 1), Err(Error::NoValue)));

    let dk = Matrix::diag(&v, 1);
    assert_eq!((dk.nrows(), dk.ncols()), (4, 4));
    assert_eq!(dk.extract_element(0, 1)?, 5);
    assert_eq!(dk.extract_element(2, 3)?, 7);

    let dneg = Matrix::diag(&v, -2);
    assert_eq!((dneg.nrows(), dneg.ncols()), (5, 5));
    assert_eq!(dneg.extract_element(2, 0)?, 5);
    assert_eq!(dneg.extract_element(4, 2)?, 7);

    let (r, c, vals) = dk.extract_tuples()?;
    assert_eq!(r, vec![0, 2]);
    assert_eq!(c, vec![1, 3]);
    assert_eq!(vals, vec![5, 7]);
    Ok(())
}

#[test]
fn kronecker_matches_block_expansion() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(2, 2)?;
    a.build(&[0, 1], &[1, 0], &[2, 3], None)?;
    let mut b = Matrix::<i64>::new(2, 2)?;
    b.build(&[0, 1], &[0, 1], &[10, 20], None)?;

    let mut k = Matrix::<i64>::new(4, 4)?;
    k.kronecker(None, None, &ops::times::<i64>(), &a, &b, Descriptor::new())?;

    let (r, c, v) = k.extract_tuples()?;
    // A[0][1]=2 expands into block (rows 0..2, cols 2..4) scaled by B;
    // A[1][0]=3 into block (rows 2..4, cols 0..2).
    assert_eq!(r, vec![0, 1, 2, 3]);
    assert_eq!(c, vec![2, 3, 0, 1]);
    assert_eq!(v, vec![20, 40, 30, 60]);

    assert_eq!(k.extract_element(1, 3)?, 40);
    assert!(matches!(k.extract_element(0, 0), Err(Error::NoValue)));
    Ok(())
}

#[test]
fn kronecker_respects_masks() -> anyhow::Result<()> {
    let mut a = Matrix::<i64>::new(1, 2)?;
    a.build(&[0, 0], &[0, 1], &[1, 2], None)?;
    let mut b = Matrix::<i64>::new(1, 1)?;
    b.build(&[0], &[0], &[5], None)?;

    let mut m = Matrix::<bool>::new(1, 2)?;
    m.build(&[0], &[1], &[true], None)?;

    let mut k = Matrix::<i64>::new(1, 2)?;
    k.kronecker(
        Some(&m.as_structure()),
        None,
        &ops::times::<i64>(),
        &a,
        &b,
        Descriptor::new().with_replace(),
    )?;
    let (r, c, v) = k.extract_tuples()?;
    assert_eq!(r, vec![0]);
    assert_eq!(c, vec![1]);
    assert_eq!(v, vec![10]);
    Ok(())
}
