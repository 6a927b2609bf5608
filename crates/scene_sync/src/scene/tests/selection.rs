//! Host selection to render entity mapping

use super::{path, Harness};
use crate::host::NodeHandle;
use std::collections::BTreeSet;

fn grp_scene() -> (Harness, NodeHandle) {
    let mut h = Harness::new();
    let root = h.scene.create_dag_node("root", &["transform"], None).unwrap();
    let grp = h.scene.create_dag_node("grp", &["transform"], Some(root)).unwrap();
    let shape = h.scene.create_dag_node("shapeA", &["mesh"], Some(grp)).unwrap();
    h.scene.create_dag_node("shapeB", &["mesh"], Some(grp)).unwrap();
    h.populate();
    (h, shape)
}

#[test]
fn test_parent_and_shape_selected_once() {
    let (mut h, _) = grp_scene();
    let selection = [
        h.scene.dag_path("/root/grp").unwrap(),
        h.scene.dag_path("/root/grp/shapeA").unwrap(),
    ];
    let result = h.ctx.populate_selected_paths(&h.scene, &selection);

    assert_eq!(result.len(), 2);
    assert!(result.contains(&path("/root/grp/shapeA")));
    assert!(result.contains(&path("/root/grp/shapeB")));
    assert_eq!(result.state().highlights().len(), 2);
}

#[test]
fn test_instances_merge_into_master() {
    let (mut h, shape) = grp_scene();
    let root = h.scene.find("/root").unwrap();
    let other = h.scene.create_dag_node("other", &["transform"], Some(root)).unwrap();
    h.scene.add_parent(shape, other).unwrap();
    h.flush();

    let selection = [
        h.scene.dag_path("/root/grp/shapeA").unwrap(),
        h.scene.dag_path("/root/other/shapeA").unwrap(),
    ];
    let result = h.ctx.populate_selected_paths(&h.scene, &selection);

    let master = path("/root/grp/shapeA");
    assert_eq!(result.len(), 1);
    assert_eq!(result.indices(&master), Some(&BTreeSet::from([0, 1])));

    let other = h.scene.dag_path("/root/other").unwrap();
    let only_other = h.ctx.populate_selected_paths(&h.scene, &[other]);
    assert_eq!(only_other.indices(&master), Some(&BTreeSet::from([1])));
}

#[test]
fn test_selection_change_bumps_collection() {
    let (mut h, _) = grp_scene();
    let collection = h.ctx.config().selection_collection.clone();
    let before = h.ctx.change_tracker().collection_version(&collection).unwrap();

    let shape_a = [h.scene.dag_path("/root/grp/shapeA").unwrap()];
    h.ctx.populate_selected_paths(&h.scene, &shape_a);
    let after_first = h.ctx.change_tracker().collection_version(&collection).unwrap();
    assert!(after_first > before);

    h.ctx.populate_selected_paths(&h.scene, &shape_a);
    assert_eq!(h.ctx.change_tracker().collection_version(&collection), Some(after_first));

    h.ctx.populate_selected_paths(&h.scene, &[]);
    assert!(h.ctx.change_tracker().collection_version(&collection).unwrap() > after_first);
}

#[test]
fn test_deleted_selection_is_empty() {
    let (mut h, shape) = grp_scene();
    let selection = [h.scene.dag_path("/root/grp/shapeA").unwrap()];
    h.scene.delete_node(shape).unwrap();
    h.flush();

    let result = h.ctx.populate_selected_paths(&h.scene, &selection);
    assert!(result.is_empty());
}
