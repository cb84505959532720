use super::{MaskIndex, MaskRun, RoiMask};

/// 按规范顺序逐个接收行程 (或单个体素), 并合并同一扫描线上首尾相接、强度相同的行程.
///
/// 调用者需保证输入已按 [`MaskRun::compare`] 升序且互不重叠;
/// 这一点只在 debug 模式下检查.
#[derive(Debug, Default)]
pub(crate) struct RunBuilder {
    runs: Vec<MaskRun>,
}

impl RunBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            runs: Vec::with_capacity(capacity),
        }
    }

    /// 最后一个已接收的行程.
    #[inline]
    pub fn last(&self) -> Option<&MaskRun> {
        self.runs.last()
    }

    /// 追加一个行程. 空行程被忽略.
    pub fn push_run(&mut self, run: MaskRun) {
        if run.is_empty() {
            return;
        }
        if let Some(last) = self.runs.last_mut() {
            debug_assert!(last.compare(&run).is_lt(), "runs pushed out of order");
            debug_assert!(!last.overlaps(&run), "overlapping runs pushed");

            // 合并后的长度需仍可由 `u32` 表示.
            if last.same_line(&run)
                && last.width_end() == run.width_start as u64
                && last.intensity == run.intensity
                && (last.width_length as u64 + run.width_length as u64) <= u32::MAX as u64
            {
                last.width_length += run.width_length;
                return;
            }
        }
        self.runs.push(run);
    }

    /// 追加单个体素.
    #[inline]
    pub fn push_voxel(&mut self, index: MaskIndex, intensity: f32) {
        self.push_run(MaskRun {
            width_start: index.x,
            width_length: 1,
            height_index: index.y,
            depth_index: index.z,
            intensity,
        });
    }

    /// 依次追加一组行程.
    #[inline]
    pub fn extend_runs<'a, I: IntoIterator<Item = &'a MaskRun>>(&mut self, runs: I) {
        runs.into_iter().for_each(|r| self.push_run(*r));
    }

    /// 完成构建. 结果满足规范形式.
    #[inline]
    pub fn finish(mut self) -> RoiMask {
        self.runs.shrink_to_fit();
        RoiMask::from_canonical(self.runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_abutting_same_intensity() {
        let mut b = RunBuilder::new();
        b.push_run(MaskRun::new(0..2, 0, 0, 1.0));
        b.push_run(MaskRun::new(2..4, 0, 0, 1.0));
        b.push_run(MaskRun::new(4..5, 0, 0, 2.0));
        b.push_run(MaskRun::new(5..6, 1, 0, 2.0));
        b.push_run(MaskRun::new(9..9, 1, 0, 2.0));
        let runs = b.finish().runs().to_vec();
        assert_eq!(
            runs,
            vec![
                MaskRun::new(0..4, 0, 0, 1.0),
                MaskRun::new(4..5, 0, 0, 2.0),
                MaskRun::new(5..6, 1, 0, 2.0),
            ]
        );
    }

    #[test]
    fn test_push_voxels() {
        let mut b = RunBuilder::new();
        for x in [3, 4, 5, 7] {
            b.push_voxel(MaskIndex::new(x, 2, 1), 0.5);
        }
        assert_eq!(
            b.finish().runs(),
            &[MaskRun::new(3..6, 2, 1, 0.5), MaskRun::new(7..8, 2, 1, 0.5)]
        );
    }
}
