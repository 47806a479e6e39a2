/// Integer rectangle with exclusive right and bottom edges.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct IRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IRect {
    pub const EMPTY: IRect = IRect::from_ltrb(0, 0, 0, 0);

    pub const fn from_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        IRect {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        IRect::from_ltrb(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    pub const fn from_wh(width: i32, height: i32) -> Self {
        IRect::from_xywh(0, 0, width, height)
    }

    pub const fn x(&self) -> i32 {
        self.left
    }

    pub const fn y(&self) -> i32 {
        self.top
    }

    pub const fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub const fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    pub const fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    pub fn contains(&self, other: &IRect) -> bool {
        !other.is_empty()
            && self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    /// The four edges as raw words, in key order.
    pub fn to_words(&self) -> [u32; 4] {
        [
            self.left as u32,
            self.top as u32,
            self.right as u32,
            self.bottom as u32,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_contains() {
        let r = IRect::from_xywh(2, 3, 10, 5);
        assert_eq!(r.width(), 10);
        assert_eq!(r.height(), 5);
        assert!(!r.is_empty());
        assert!(IRect::from_wh(0, 4).is_empty());
        assert!(r.contains(&IRect::from_xywh(4, 4, 2, 2)));
        assert!(!r.contains(&IRect::from_xywh(0, 0, 2, 2)));
    }
}
