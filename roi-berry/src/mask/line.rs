use super::MaskRun;
use crate::LineKey;

/// 扫描线迭代器. 将有序的行程切片按 `(depth, height)` 分组, 每次返回一条扫描线上的所有行程.
///
/// 该迭代器不分配内存; 返回的切片直接借用自输入.
#[derive(Debug, Clone)]
pub(crate) struct Lines<'a> {
    rest: &'a [MaskRun],
}

impl<'a> Lines<'a> {
    /// `runs` 必须已按 [`MaskRun::compare`] 排序.
    #[inline]
    pub fn new(runs: &'a [MaskRun]) -> Self {
        Self { rest: runs }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = (LineKey, &'a [MaskRun]);

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.first()?;
        let key = first.line();
        let len = self
            .rest
            .iter()
            .position(|r| r.line() != key)
            .unwrap_or(self.rest.len());
        let (line, rest) = self.rest.split_at(len);
        self.rest = rest;
        Some((key, line))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::from(!self.rest.is_empty()), Some(self.rest.len()))
    }
}

/// 按 depth 分组的切片范围. 返回 `(depth, 起始下标, 结束下标)`.
pub(crate) fn depth_ranges(runs: &[MaskRun]) -> Vec<(u32, usize, usize)> {
    let mut ans = Vec::new();
    let mut start = 0;
    while start < runs.len() {
        let depth = runs[start].depth_index;
        let end = start + runs[start..].partition_point(|r| r.depth_index == depth);
        ans.push((depth, start, end));
        start = end;
    }
    ans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_grouping() {
        let runs = [
            MaskRun::new(0..2, 0, 0, 1.0),
            MaskRun::new(4..6, 0, 0, 1.0),
            MaskRun::new(1..2, 3, 0, 1.0),
            MaskRun::new(0..9, 0, 2, 1.0),
        ];
        let v: Vec<_> = Lines::new(&runs).collect();
        assert_eq!(v.len(), 3);
        assert_eq!(v[0].0, (0, 0));
        assert_eq!(v[0].1.len(), 2);
        assert_eq!(v[1].0, (0, 3));
        assert_eq!(v[2].0, (2, 0));
        assert_eq!(v[2].1, &runs[3..]);

        assert_eq!(Lines::new(&[]).count(), 0);
    }

    #[test]
    fn test_depth_ranges() {
        let runs = [
            MaskRun::new(0..2, 0, 0, 1.0),
            MaskRun::new(0..2, 5, 0, 1.0),
            MaskRun::new(0..2, 1, 4, 1.0),
        ];
        assert_eq!(depth_ranges(&runs), vec![(0, 0, 2), (4, 2, 3)]);
        assert!(depth_ranges(&[]).is_empty());
    }
}
