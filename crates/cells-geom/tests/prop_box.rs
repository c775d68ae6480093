use cells_geom::{BlockBox, BlockPos};
use proptest::prelude::*;

fn coord() -> impl Strategy<Value = i32> {
    -100_000i32..=100_000
}

fn arb_pos() -> impl Strategy<Value = BlockPos> {
    (coord(), coord(), coord()).prop_map(|(x, y, z)| BlockPos::new(x, y, z))
}

proptest! {
    // Corners are always inside; one past max on any axis is outside
    #[test]
    fn corners_inclusive(origin in arb_pos(), extent in 0i32..512) {
        let b = BlockBox::from_origin_extent(origin, extent);
        prop_assert!(b.contains(b.min));
        prop_assert!(b.contains(b.max));
        prop_assert!(!b.contains(b.max.offset(1, 0, 0)));
        prop_assert!(!b.contains(b.max.offset(0, 1, 0)));
        prop_assert!(!b.contains(b.max.offset(0, 0, 1)));
        prop_assert!(!b.contains(b.min.offset(-1, 0, 0)));
        prop_assert!(!b.contains(b.min.offset(0, -1, 0)));
        prop_assert!(!b.contains(b.min.offset(0, 0, -1)));
    }

    // Containment is invariant under translating box and point together
    #[test]
    fn contains_translation_invariant(a in arb_pos(), b in arb_pos(), p in arb_pos(), t in arb_pos()) {
        let bx = BlockBox::new(a, b);
        prop_assert_eq!(bx.contains(p), bx.translated(t).contains(p + t));
    }

    #[test]
    fn add_sub_inverse(a in arb_pos(), b in arb_pos()) {
        prop_assert_eq!((a + b) - b, a);
        prop_assert_eq!(a + (-a), BlockPos::ZERO);
    }
}

#[test]
fn size_counts_inclusive_bounds() {
    let b = BlockBox::from_origin_extent(BlockPos::new(10, 64, -5), 3);
    assert_eq!(b.size(), BlockPos::splat(4));
    assert_eq!(b.volume(), 64);
}

#[test]
fn display_matches_colon_format() {
    assert_eq!(BlockPos::new(1, -2, 3).to_string(), "1:-2:3");
}
