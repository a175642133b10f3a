/*
    Tombstone tests

    Deletion is a boolean register like any other field: it merges by
    stamp, never erases other registers, and can be undone by a newer write.
*/

use crate::core_canvas::model::{fields, FieldValue, Rect};
use crate::core_canvas::replica::Replica;
use crate::test_utils::{entity, op_at, site};

#[test]
fn test_stale_edit_after_delete_keeps_tombstone() {
    // delete at (5,A); an older y edit at (3,A) arrives afterwards
    let e = entity(1);
    let a = site(1);
    let mut replica = Replica::new(site(2));
    replica.apply_remote(op_at(e, fields::X, 0.0, 1, a)).unwrap();
    replica.apply_remote(op_at(e, fields::TOMBSTONE, true, 5, a)).unwrap();
    replica.apply_remote(op_at(e, fields::Y, 7.0, 3, a)).unwrap();

    let stored = replica.get(&e).unwrap();
    assert!(stored.is_tombstoned());
    assert_eq!(stored.get(fields::Y), Some(&FieldValue::Number(7.0)));
    assert!(replica.query_ids(Rect::new(-1.0, -1.0, 20.0, 20.0)).is_empty());
    replica.check_index().unwrap();
}

#[test]
fn test_tombstoned_entity_leaves_index_in_either_order() {
    let e = entity(2);
    let position = [op_at(e, fields::X, 1.0, 1, site(1)), op_at(e, fields::Y, 1.0, 2, site(1))];
    let delete = op_at(e, fields::TOMBSTONE, true, 3, site(2));

    let mut first = Replica::new(site(5));
    for op in position.iter().cloned() {
        first.apply_remote(op).unwrap();
    }
    first.apply_remote(delete.clone()).unwrap();

    let mut second = Replica::new(site(6));
    second.apply_remote(delete).unwrap();
    for op in position {
        second.apply_remote(op).unwrap();
    }

    for replica in [&first, &second] {
        assert!(replica.index().is_empty());
        replica.check_index().unwrap();
    }
    assert_eq!(first.store(), second.store());
}

#[test]
fn test_undelete_with_newer_stamp() {
    let mut replica = Replica::new(site(1));
    let (id, _) = replica.create(Rect::new(0.0, 0.0, 2.0, 2.0)).unwrap();
    replica.delete(id).unwrap();
    replica.restore(id).unwrap();
    assert!(!replica.get(&id).unwrap().is_tombstoned());
    assert_eq!(replica.query_ids(Rect::new(1.0, 1.0, 0.0, 0.0)), vec![id]);
}

#[test]
fn test_concurrent_delete_and_undelete_resolve_by_stamp() {
    let e = entity(3);
    let delete = op_at(e, fields::TOMBSTONE, true, 4, site(1));
    let undelete = op_at(e, fields::TOMBSTONE, false, 4, site(2));

    let mut a = Replica::new(site(10));
    a.apply_remote(delete.clone()).unwrap();
    a.apply_remote(undelete.clone()).unwrap();
    let mut b = Replica::new(site(11));
    b.apply_remote(undelete).unwrap();
    b.apply_remote(delete).unwrap();

    // (4, site 2) > (4, site 1)
    assert!(!a.get(&e).unwrap().is_tombstoned());
    assert_eq!(a.store(), b.store());
}

#[test]
fn test_move_while_deleted_is_indexed_on_restore() {
    let mut replica = Replica::new(site(1));
    let (id, _) = replica.create(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
    replica.delete(id).unwrap();
    replica.apply_local(id, fields::X, 500.0).unwrap();
    assert!(replica.index().is_empty());

    replica.restore(id).unwrap();
    assert_eq!(replica.index().get(&id), Some(Rect::new(500.0, 0.0, 1.0, 1.0)));
}
