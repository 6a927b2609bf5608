//! Promotion and demotion of multiply-instanced shapes

use super::{path, Harness};
use crate::adapter::keys;
use crate::config::SyncConfig;
use crate::foundation::math::{Transform, Vec3};
use crate::host::{AttrValue, NodeHandle};
use std::collections::BTreeSet;

struct Rig {
    h: Harness,
    shape: NodeHandle,
    x: NodeHandle,
    y: NodeHandle,
    z: NodeHandle,
}

fn rig(config: SyncConfig) -> Rig {
    let mut h = Harness::with_config(config);
    let root = h.scene.create_dag_node("root", &["transform"], None).unwrap();
    let x = h.scene.create_dag_node("x", &["transform"], Some(root)).unwrap();
    let y = h.scene.create_dag_node("y", &["transform"], Some(root)).unwrap();
    let z = h.scene.create_dag_node("z", &["transform"], Some(root)).unwrap();
    let shape = h.scene.create_dag_node("shape", &["mesh"], Some(x)).unwrap();
    h.scene
        .set_local_transform(y, Transform::from_position(Vec3::new(0.0, 0.0, 7.0)).to_matrix())
        .unwrap();
    assert_eq!(h.populate(), 1);
    Rig { h, shape, x, y, z }
}

#[test]
fn test_second_occurrence_promotes_master() {
    let mut r = rig(SyncConfig::default());
    let master = path("/root/x/shape");

    r.h.scene.add_parent(r.shape, r.y).unwrap();
    let report = r.h.flush();

    assert_eq!(report.callback_rebuilds, 1);
    assert_eq!(report.prim_rebuilds, 0);
    assert_eq!(r.h.ctx.instances().record_count(), 1);
    assert_eq!(
        r.h.ctx.instances().record_for_master(&master).unwrap().indices(),
        BTreeSet::from([0, 1])
    );
    assert_eq!(r.h.ctx.adapter_count(), 1);
    assert!(r.h.has_entity("/root/x/shape/instancer"));
    assert!(!r.h.has_entity("/root/y/shape"));

    let Some(AttrValue::MatrixArray(transforms)) =
        r.h.ctx.get(&r.h.scene, &master, keys::INSTANCE_TRANSFORMS)
    else {
        panic!("expected instance transforms");
    };
    assert_eq!(transforms.len(), 2);
    assert!((transforms[1][(2, 3)] - 7.0).abs() < 1e-9);
}

#[test]
fn test_third_occurrence_extends_without_structural_rebuild() {
    let mut r = rig(SyncConfig::default());
    let master = path("/root/x/shape");
    r.h.scene.add_parent(r.shape, r.y).unwrap();
    r.h.flush();

    r.h.scene.add_parent(r.shape, r.z).unwrap();
    let report = r.h.flush();

    assert_eq!(report.prim_rebuilds, 0);
    assert_eq!(report.callback_rebuilds, 0);
    assert_eq!(report.recreated, 0);
    assert_eq!(r.h.ctx.instances().record_count(), 1);
    assert_eq!(
        r.h.ctx.instances().record_for_master(&master).unwrap().indices(),
        BTreeSet::from([0, 1, 2])
    );
    assert_eq!(r.h.entity_count(), 2);
    assert_eq!(
        r.h.ctx.get(&r.h.scene, &master, keys::INSTANCE_INDICES),
        Some(AttrValue::IntArray(vec![0, 1, 2]))
    );

    // the new occurrence's parent is tracked without a rebuild
    r.h.scene
        .set_local_transform(r.z, Transform::from_position(Vec3::new(4.0, 0.0, 0.0)).to_matrix())
        .unwrap();
    let report = r.h.flush();
    assert_eq!(report.dirtied, 1);
    let Some(AttrValue::MatrixArray(transforms)) =
        r.h.ctx.get(&r.h.scene, &master, keys::INSTANCE_TRANSFORMS)
    else {
        panic!("expected instance transforms");
    };
    assert!((transforms[2][(0, 3)] - 4.0).abs() < 1e-9);
}

#[test]
fn test_instance_ancestor_transform_is_tracked() {
    let mut r = rig(SyncConfig::default());
    let master = path("/root/x/shape");
    r.h.scene.add_parent(r.shape, r.y).unwrap();
    r.h.flush();

    r.h.scene
        .set_local_transform(r.y, Transform::from_position(Vec3::new(0.0, 0.0, -3.0)).to_matrix())
        .unwrap();
    let report = r.h.flush();
    assert_eq!(report.dirtied, 1);

    let Some(AttrValue::MatrixArray(transforms)) =
        r.h.ctx.get(&r.h.scene, &master, keys::INSTANCE_TRANSFORMS)
    else {
        panic!("expected instance transforms");
    };
    assert!((transforms[1][(2, 3)] + 3.0).abs() < 1e-9);
}

#[test]
fn test_back_to_one_occurrence_demotes() {
    let mut r = rig(SyncConfig::default());
    let master = path("/root/x/shape");
    r.h.scene.add_parent(r.shape, r.y).unwrap();
    r.h.flush();

    r.h.scene.remove_parent(r.shape, r.y).unwrap();
    let report = r.h.flush();

    assert_eq!(report.recreated, 1);
    assert_eq!(r.h.ctx.instances().record_count(), 0);
    assert_eq!(r.h.entity_count(), 1);
    assert!(r.h.has_entity("/root/x/shape"));
    assert!(r.h.ctx.get(&r.h.scene, &master, keys::INSTANCE_INDICES).is_none());
}

#[test]
fn test_losing_master_occurrence_moves_master() {
    let mut r = rig(SyncConfig::default());
    r.h.scene.add_parent(r.shape, r.y).unwrap();
    r.h.flush();

    r.h.scene.remove_parent(r.shape, r.x).unwrap();
    r.h.flush();

    assert!(r.h.ctx.lookup_adapter(&path("/root/x/shape")).is_none());
    assert!(r.h.has_entity("/root/y/shape"));
    assert_eq!(r.h.entity_count(), 1);
    assert_eq!(r.h.ctx.adapter_count(), 1);
}

#[test]
fn test_deleting_instanced_shape_removes_everything() {
    let mut r = rig(SyncConfig::default());
    r.h.scene.add_parent(r.shape, r.y).unwrap();
    r.h.flush();

    r.h.scene.delete_node(r.shape).unwrap();
    let report = r.h.flush();

    assert_eq!(report.removed, 1);
    assert_eq!(r.h.entity_count(), 0);
    assert_eq!(r.h.ctx.instances().record_count(), 0);
    assert!(r.h.ctx.services().hub().is_empty());
    assert!(r.h.scene.find("/root/x").is_some_and(|x| x == r.x));
}

#[test]
fn test_instancing_disabled_syncs_first_occurrence_only() {
    let mut r = rig(SyncConfig::default().with_instancing(false));
    r.h.scene.add_parent(r.shape, r.y).unwrap();
    r.h.flush();

    assert_eq!(r.h.ctx.instances().record_count(), 0);
    assert_eq!(r.h.entity_count(), 1);
    assert!(r.h.has_entity("/root/x/shape"));
}
