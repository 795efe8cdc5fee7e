use ferroblas::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn dense_mult(a: &[Vec<f64>], b: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = a.len();
    let m = b[0].len();
    let k = b.len();
    let mut out = vec![vec![0.0; m]; n];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            for (p, brow) in b.iter().enumerate().take(k) {
                *cell += a[i][p] * brow[j];
            }
        }
    }
    out
}

fn random_matrix(rng: &mut StdRng, nr: usize, nc: usize, density: f64) -> anyhow::Result<(Matrix<f64>, Vec<Vec<f64>>)> {
    let mut dense = vec![vec![0.0; nc]; nr];
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    let mut vals = Vec::new();
    for (r, row) in dense.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            if rng.r#gen::<f64>() < density {
                let v = rng.gen_range(-4..=4) as f64;
                *cell = v;
                rows.push(r as Ix);
                cols.push(c as Ix);
                vals.push(v);
            }
        }
    }
    let mut m = Matrix::<f64>::new(nr as Ix, nc as Ix)?;
    m.build(&rows, &cols, &vals, None)?;
    Ok((m, dense))
}

fn assert_matches_dense(m: &Matrix<f64>, dense: &[Vec<f64>]) -> anyhow::Result<()> {
    let (r, c, v) = m.extract_tuples()?;
    let mut got = vec![vec![0.0; dense[0].len()]; dense.len()];
    for ((r, c), v) in r.into_iter().zip(c).zip(v) {
        got[r as usize][c as usize] = v;
    }
    // Stored zeros are legitimate entries under plus-times; compare as maps
    // to dense values (absent = 0).
    for (gr, dr) in got.iter().zip(dense) {
        for (gv, dv) in gr.iter().zip(dr) {
            assert!((gv - dv).abs() < 1e-9, "mismatch: {gv} vs {dv}");
        }
    }
    Ok(())
}

#[test]
fn mxm_matches_dense_reference() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..5 {
        let (a, ad) = random_matrix(&mut rng, 7, 9, 0.4)?;
        let (b, bd) = random_matrix(&mut rng, 9, 6, 0.4)?;
        let mut c = Matrix::<f64>::new(7, 6)?;
        c.mxm(None, None, &ops::plus_times::<f64>(), &a, &b, Descriptor::new())?;
        assert_matches_dense(&c, &dense_mult(&ad, &bd))?;
    }
    Ok(())
}

#[test]
fn mxm_with_transposed_inputs() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(11);
    let (a, ad) = random_matrix(&mut rng, 5, 8, 0.5)?;
    let (b, bd) = random_matrix(&mut rng, 5, 6, 0.5)?;

    // C = Aᵀ · B (8x5 · 5x6).
    let mut c = Matrix::<f64>::new(8, 6)?;
    c.mxm(
        None,
        None,
        &ops::plus_times::<f64>(),
        &a,
        &b,
        Descriptor::new().with_transpose0(),
    )?;

    let mut at = vec![vec![0.0; 5]; 8];
    for (r, row) in ad.iter().enumerate() {
        for (c2, v) in row.iter().enumerate() {
            at[c2][r] = *v;
        }
    }
    assert_matches_dense(&c, &dense_mult(&at, &bd))?;
    Ok(())
}

#[test]
fn mxv_and_vxm_agree_with_dense() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(23);
    let (a, ad) = random_matrix(&mut rng, 6, 7, 0.5)?;

    let mut u = Vector::<f64>::new(7)?;
    let mut ud = vec![0.0; 7];
    for i in [0, 2, 5] {
        u.set_element(i, (i + 1) as f64)?;
        ud[i as usize] = (i + 1) as f64;
    }

    let mut w = Vector::<f64>::new(6)?;
    w.mxv(None, None, &ops::plus_times::<f64>(), &a, &u, Descriptor::new())?;
    let (idx, val) = w.extract_tuples()?;
    let mut got = vec![0.0; 6];
    for (i, v) in idx.into_iter().zip(val) {
        got[i as usize] = v;
    }
    for (r, row) in ad.iter().enumerate() {
        let want: f64 = row.iter().zip(&ud).map(|(x, y)| x * y).sum();
        assert!((got[r] - want).abs() < 1e-9);
    }

    // u · A == Aᵀ · u.
    let mut x = Vector::<f64>::new(7)?;
    let mut ue = Vector::<f64>::new(6)?;
    let mut ued = vec![0.0; 6];
    for i in [1, 3] {
        ue.set_element(i, 2.0)?;
        ued[i as usize] = 2.0;
    }
    x.vxm(None, None, &ops::plus_times::<f64>(), &ue, &a, Descriptor::new())?;
    let (idx, val) = x.extract_tuples()?;
    let mut got = vec![0.0; 7];
    for (i, v) in idx.into_iter().zip(val) {
        got[i as usize] = v;
    }
    for c in 0..7 {
        let want: f64 = (0..6).map(|r| ad[r][c] * ued[r]).sum();
        assert!((got[c] - want).abs() < 1e-9);
    }
    Ok(())
}

#[test]
fn mxm_extract_one_without_materialize() -> anyhow::Result<()> {
    // Scenario S6: read one element of a deferred product, materialize, and
    // read it again; the two reads agree.
    let mut a = Matrix::<f64>::new(5, 5)?;
    a.build(&[0, 1, 2, 4], &[1, 2, 0, 3], &[2.0, 3.0, 4.0, 5.0], None)?;
    let mut b = Matrix::<f64>::new(5, 5)?;
    b.build(&[1, 2, 0, 3], &[0, 0, 4, 2], &[10.0, 20.0, 30.0, 40.0], None)?;

    let mut c = Matrix::<f64>::new(5, 5)?;
    c.mxm(
        None,
        Some(&ops::plus::<f64>()),
        &ops::plus_times::<f64>(),
        &a,
        &b,
        Descriptor::new(),
    )?;

    // c[0][0] = a[0][1] * b[1][0] = 2 * 10.
    let before = c.extract_element(0, 0)?;
    c.wait(WaitMode::Materialize)?;
    let after = c.extract_element(0, 0)?;
    assert_eq!(before, 20.0);
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn masked_mxm_restricts_output() -> anyhow::Result<()> {
    let mut a = Matrix::<f64>::new(3, 3)?;
    a.build(&[0, 1, 2], &[0, 1, 2], &[1.0, 2.0, 3.0], None)?;
    let mut b = Matrix::<f64>::new(3, 3)?;
    b.build(&[0, 1, 2], &[0, 1, 2], &[4.0, 5.0, 6.0], None)?;

    let mut m = Matrix::<bool>::new(3, 3)?;
    m.build(&[1], &[1], &[true], None)?;

    let mut c = Matrix::<f64>::new(3, 3)?;
    c.mxm(
        Some(&m.as_structure()),
        None,
        &ops::plus_times::<f64>(),
        &a,
        &b,
        Descriptor::new().with_replace(),
    )?;
    let (r, cc, v) = c.extract_tuples()?;
    assert_eq!(r, vec![1]);
    assert_eq!(cc, vec![1]);
    assert_eq!(v, vec![10.0]);
    Ok(())
}

#[test]
fn min_plus_semiring_shortest_step() -> anyhow::Result<()> {
    // One relaxation step of shortest paths under min-plus.
    let mut a = Matrix::<f64>::new(3, 3)?;
    a.build(&[0, 0, 1], &[1, 2, 2], &[1.0, 5.0, 2.0], None)?;
    let mut d = Vector::<f64>::new(3)?;
    d.set_element(0, 0.0)?;

    let mut next = Vector::<f64>::new(3)?;
    next.vxm(None, None, &ops::min_plus::<f64>(), &d, &a, Descriptor::new())?;
    let (idx, val) = next.extract_tuples()?;
    assert_eq!(idx, vec![1, 2]);
    assert_eq!(val, vec![1.0, 5.0]);
    Ok(())
}
