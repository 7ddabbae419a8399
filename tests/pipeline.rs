//! End-to-end exercise of the core pipeline: compose a velocity volume
//! from sections, compute a travel-time field, push it through the file
//! format, and derive a hypocenter uncertainty record from sample
//! statistics.

use hypogrid::authoring::*;

fn tmp_root(name: &str) -> String {
    let dir = std::env::temp_dir().join("hypogrid-pipeline");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name).to_str().unwrap().to_string()
}

/// A section grid with velocity increasing linearly with depth
fn gradient_section(x0: f64, y0: f64, x1: f64, y1: f64) -> Section2D {
    let length = (x1 - x0).hypot(y1 - y0);
    let ny = 40;
    let nz = 30;
    let hdr = GridHdr::new(
        1,
        ny,
        nz,
        0.,
        0.,
        0.,
        1.,
        length / (ny - 1) as f64,
        10.,
        GridKind::Velocity,
    );
    let mut grid = Grid3::allocate(hdr).unwrap();
    for iy in 0..ny {
        for iz in 0..nz {
            let vel = 5.0 + 0.005 * (iz as f32 * 10.0);
            grid.set(0, iy, iz, vel);
        }
    }
    Section2D::new(x0, y0, x1, y1, grid).unwrap()
}

#[test]
fn sections_to_travel_times_to_statistics() -> Result<(), Error> {
    // --- Compose a 3D model from two crossing sections --------------------
    let sections = vec![
        gradient_section(-150.0, 0.0, 150.0, 0.0),
        gradient_section(0.001, -150.0, 0.002, 150.0),
    ];
    let n = 21;
    let h = 10.0;
    let hdr = GridHdr::new(n, n, n, -100., -100., 0., h, h, h, GridKind::SlowLen);
    let mut model = Grid3::allocate(hdr)?;
    let counters = compose_polar(&mut model, &sections, &ComposeConfig::default())?;
    assert_eq!(counters.defaults, 0);

    // The composed slowness*length values decode to the section gradient
    let vel_top = model.hdr.kind.velocity_from(model.value_at(10, 10, 0) as f64, h)?;
    let vel_bottom = model
        .hdr
        .kind
        .velocity_from(model.value_at(10, 10, n - 1) as f64, h)?;
    assert!(vel_top > 4.9 && vel_top < 5.2, "top velocity {vel_top}");
    assert!(vel_bottom > vel_top, "no gradient: {vel_top} {vel_bottom}");

    // --- Travel times from a central surface source -----------------------
    let frame = SphericalFrame::new(42.633, 74.5, 0.0, h);
    let src = SrcLoc::new("EV01", 42.633, 74.5, 0.0);
    // Anchor the frame so the source sits mid-grid
    let (fx, fy, _) = frame.grid_coords(src.lat, src.lon, src.depth);
    assert!(fx.abs() < 1e-6 && fy.abs() < 1e-6);
    let frame = SphericalFrame {
        lon0: frame.lon0 - 10.0 * frame.df,
        colat0: frame.colat0 - 10.0 * frame.dq,
        ..frame
    };

    let times = travel_time(&model, &frame, &src, &SolverConfig::default())?;
    assert_eq!(times.hdr.kind, GridKind::Time);
    assert_eq!(times.hdr.source.as_ref().unwrap().label, "EV01");

    // Sanity: the straight-down time matches the vertical profile within
    // a few percent
    let t_down = times.value_at(10, 10, n - 1) as f64;
    let mut expected = 0.0;
    for iz in 0..(n - 1) {
        let v0 = model.hdr.kind.velocity_from(model.value_at(10, 10, iz) as f64, h)?;
        let v1 = model
            .hdr
            .kind
            .velocity_from(model.value_at(10, 10, iz + 1) as f64, h)?;
        expected += h / (0.5 * (v0 + v1));
    }
    // Refracted paths may shave a little off the vertical integral
    assert!(
        t_down <= expected * 1.03 && t_down >= expected * 0.8,
        "vertical time {t_down} vs profile integral {expected}"
    );

    // --- Through the on-disk format --------------------------------------
    let root = tmp_root("ev01.time");
    times.write(&root)?;
    let reread = Grid3::read(&root)?;
    assert!(reread.identical_geometry(&times));
    assert_eq!(reread.hdr.source, times.hdr.source);
    let a = times.interp_at(-25.0, 35.0, 55.0).unwrap();
    let b = reread.interp_at(-25.0, 35.0, 55.0).unwrap();
    assert!((a - b).abs() < 1e-9);

    // --- Location statistics over a synthetic sample cloud ----------------
    // An elongated cloud: north-south stretched, shallow
    let mut samples = Vec::new();
    for k in 0..500 {
        let t = (k as f64 / 500.0) * std::f64::consts::TAU;
        samples.push(Sample::new(
            74.5 + 0.02 * t.cos(),
            42.633 + 0.08 * t.sin(),
            10.0 + 2.0 * (3.0 * t).sin(),
            1.0,
        ));
    }
    let expect = expectation_global(&samples, samples[0].x);
    assert!((expect[0] - 74.5).abs() < 1e-3);
    assert!((expect[1] - 42.633).abs() < 1e-3);

    let cov = covariance_global(&samples, &expect);
    // North-south variance dominates
    assert!(cov[1][1] > 5.0 * cov[0][0]);

    let ell = error_ellipsoid(&cov, DELTA_CHI_SQR_68_3)?;
    assert!(ell.len1 <= ell.len2 && ell.len2 <= ell.len3);
    // Major axis points north-south
    let folded = if ell.az3 >= 180.0 { ell.az3 - 180.0 } else { ell.az3 };
    assert!(folded < 15.0 || folded > 165.0);

    // --- The summary record ------------------------------------------------
    let hypo = Hypocenter {
        fileroot: tmp_root("ev01"),
        status: "LOCATED".to_string(),
        status_comment: "Location completed.".to_string(),
        year: 2016,
        month: 10,
        day: 19,
        hour: 3,
        minute: 21,
        second: 7.432,
        lat: expect[1],
        lon: expect[0],
        depth: expect[2],
        prob_max: 1.0,
        misfit_min: 0.2,
        misfit_max: 1.9,
        rms: 0.21,
        nphs: 17,
        gap: 88.0,
        dist: 9.6,
        expect,
        cov,
        ellipsoid: ell,
    };
    let record = hypo.to_record()?;
    assert!(record.starts_with("NLLOC \""));
    assert!(record.contains("QML_ConfidenceEllipsoid"));
    assert!(record.ends_with("END_NLLOC\n\n"));

    Ok(())
}

#[test]
fn spherical_shell_scenario() -> Result<(), Error> {
    // A 101 x 101 x 65 shell with 10 km cells, uniform 6 km/s, shallow
    // source over the grid-centre column: the arrival 300 km straight
    // down matches the straight ray within 5%
    let (nx, nz) = (101, 65);
    let h = 10.0;
    let hdr = GridHdr::new(nx, nx, nz, 0., 0., 0., h, h, h, GridKind::SlowLen);
    let mut model = Grid3::allocate(hdr)?;
    let stored = GridKind::SlowLen.store_velocity(6.0, h)? as f32;
    model.init(stored);

    let frame = SphericalFrame::new(42.633, 74.5, 0.0, h);
    let half = (nx - 1) as f64 / 2.0;
    let frame = SphericalFrame {
        lon0: frame.lon0 - half * frame.df,
        colat0: frame.colat0 - half * frame.dq,
        ..frame
    };
    let src = SrcLoc::new("SHELL", 42.633, 74.5, 0.3);

    let times = travel_time(&model, &frame, &src, &SolverConfig::default())?;

    let (fxs, fys, fzs) = frame.grid_coords(src.lat, src.lon, src.depth);
    let src_cart = frame.node_cart(fxs, fys, fzs);
    let receiver = frame.node_cart(half, half, 30.0);
    let d = receiver.dist(src_cart);
    assert!((d - 300.0).abs() < 5.0, "receiver offset {d} km");

    let expected = d / 6.0;
    let got = times.value_at(50, 50, 30) as f64;
    assert!(
        ((got - expected) / expected).abs() <= 0.05,
        "shell arrival {got} vs {expected}"
    );
    Ok(())
}

#[test]
fn cascading_model_feeds_the_solver() -> Result<(), Error> {
    // A cascading velocity model still provides slowness through the
    // virtual index, and the solver emits a regular time grid
    let n = 17;
    let h = 10.0;
    let mut hdr = GridHdr::new(n, n, n, 0., 0., 0., h, h, h, GridKind::SlowLen);
    hdr.merge_depths = vec![60.0, 120.0];
    let mut model = Grid3::allocate(hdr)?;
    let stored = GridKind::SlowLen.store_velocity(6.0, h)? as f32;
    model.init(stored);
    assert!(model.num_cells() < n * n * n);

    let frame = SphericalFrame::new(42.633, 74.5, 0.0, h);
    let frame = SphericalFrame {
        lon0: frame.lon0 - 8.0 * frame.df,
        colat0: frame.colat0 - 8.0 * frame.dq,
        ..frame
    };
    let src = SrcLoc::new("EV02", 42.633, 74.5, 80.0);

    let times = travel_time(&model, &frame, &src, &SolverConfig::default())?;
    assert!(times.hdr.merge_depths.is_empty());
    assert_eq!(times.num_cells(), n * n * n);

    // Homogeneous medium: time to a corner within 5% of the straight ray
    let (fxs, fys, fzs) = frame.grid_coords(src.lat, src.lon, src.depth);
    let src_cart = frame.node_cart(fxs, fys, fzs);
    let corner = frame.node_cart(0.0, 0.0, 0.0);
    let expected = corner.dist(src_cart) / 6.0;
    let got = times.value_at(0, 0, 0) as f64;
    assert!(
        ((got - expected) / expected).abs() < 0.05,
        "corner time {got} vs {expected}"
    );
    Ok(())
}
