//! Integer window/content geometry.

use cgmath::Vector2;

/// A size in pixels.
///
/// Window and widget geometry is integral: backends ultimately deal in whole
/// pixels, and keeping sizes integral makes layout negotiation comparisons
/// exact.
pub type Size = Vector2<i32>;

/// Returns a zero size.
pub fn zero() -> Size {
    Vector2::new(0, 0)
}

/// Component-wise maximum of two sizes.
pub fn max_size(a: Size, b: Size) -> Size {
    Vector2::new(a.x.max(b.x), a.y.max(b.y))
}

/// Clamps `size` upward so that neither component is below `minimum`.
pub fn clamp_to_minimum(size: Size, minimum: Size) -> Size {
    max_size(size, minimum)
}

/// The offset that centers `content` inside `container`.
///
/// May be negative if the content is larger than the container; callers that
/// clamp the proposal to the content's minimum size first will never see that
/// case.
pub fn centering_offset(container: Size, content: Size) -> Size {
    Vector2::new((container.x - content.x) / 2, (container.y - content.y) / 2)
}

#[test]
fn centering() {
    assert_eq!(
        centering_offset(Size::new(100, 50), Size::new(60, 20)),
        Size::new(20, 15)
    );
    assert_eq!(
        centering_offset(Size::new(10, 10), Size::new(10, 10)),
        Size::new(0, 0)
    );
}
