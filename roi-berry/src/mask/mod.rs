use std::fmt;

use log::{debug, trace};
use once_cell::sync::OnceCell;

use crate::consts::DEFAULT_FILL_INTENSITY;
use crate::{MaskError, MaskResult};

mod algebra;
mod builder;
mod codec;
pub(crate) mod line;
mod run;

pub(crate) use builder::RunBuilder;
pub use run::{IndexesInRun, MaskIndex, MaskRun};

/// 稀疏三维 ROI 掩膜.
///
/// 掩膜只保存一组满足规范形式的行程:
///
/// 1. 按 `(depth_index, height_index, width_start)` 升序;
/// 2. 同一扫描线上的行程互不重叠;
/// 3. 同一扫描线上首尾相接且强度相同的行程已合并.
///
/// 所有构造函数 (除 [`RoiMask::from_sorted_runs_unchecked`]) 和派生操作都保证以上性质,
/// 因此两个掩膜相等当且仅当它们的行程序列逐项相等.
///
/// 掩膜一经创建便不可修改. 展开后的体素索引列表在首次访问时计算并缓存.
#[derive(Clone, Default)]
pub struct RoiMask {
    runs: Vec<MaskRun>,
    indexes: OnceCell<Vec<MaskIndex>>,
}

impl fmt::Debug for RoiMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoiMask").field("runs", &self.runs).finish()
    }
}

impl PartialEq for RoiMask {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.runs == other.runs
    }
}

/// 行程右端点 (不含) 的上限. 行程的最后一个索引不能超过 `u32::MAX`.
const WIDTH_END_LIMIT: u64 = u32::MAX as u64 + 1;

/// 强度为 NaN 的行程或体素不能进入掩膜.
fn check_intensity<T: fmt::Debug>(item: &T, intensity: f32) -> MaskResult<()> {
    if intensity.is_nan() {
        return Err(MaskError::MalformedInput(format!("{item:?} has NaN intensity")));
    }
    Ok(())
}

/// 单趟校验并规范化已排序的行程. 空行程被丢弃.
fn canonicalize<I>(runs: I, capacity: usize) -> MaskResult<RoiMask>
where
    I: IntoIterator<Item = MaskRun>,
{
    let mut builder = RunBuilder::with_capacity(capacity);
    let mut dropped = 0_usize;
    for run in runs {
        if run.is_empty() {
            dropped += 1;
            continue;
        }
        check_intensity(&run, run.intensity)?;
        if run.width_end() > WIDTH_END_LIMIT {
            return Err(MaskError::MalformedInput(format!(
                "run {run:?} extends past the u32 index domain"
            )));
        }
        if let Some(last) = builder.last() {
            if last.same_line(&run) && last.width_end() > run.width_start as u64 {
                return Err(MaskError::MalformedInput(format!(
                    "run {run:?} overlaps {last:?}"
                )));
            }
            if !last.compare(&run).is_lt() {
                return Err(MaskError::MalformedInput(format!(
                    "run {run:?} is out of order after {last:?}"
                )));
            }
        }
        builder.push_run(run);
    }
    if dropped > 0 {
        trace!("dropped {dropped} empty runs");
    }
    Ok(builder.finish())
}

impl RoiMask {
    /// 空掩膜.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 由已满足规范形式的行程直接构建.
    #[inline]
    pub(crate) fn from_canonical(runs: Vec<MaskRun>) -> Self {
        Self {
            runs,
            indexes: OnceCell::new(),
        }
    }

    /// 由任意顺序的行程构建掩膜.
    ///
    /// 行程先按 [`MaskRun::compare`] 排序; 空行程被丢弃; 首尾相接且强度相同的行程被合并.
    ///
    /// # 错误
    ///
    /// 行程之间有重叠, 行程越出 `u32` 索引范围, 或强度为 NaN 时返回
    /// [`MaskError::MalformedInput`].
    pub fn from_runs(mut runs: Vec<MaskRun>) -> MaskResult<Self> {
        let n = runs.len();
        runs.sort_by(MaskRun::compare);
        let mask = canonicalize(runs, n)?;
        debug!("from_runs: {} runs in, {} runs kept", n, mask.run_count());
        Ok(mask)
    }

    /// 由已按 [`MaskRun::compare`] 升序排列的行程构建掩膜. 跳过排序, 但仍做单趟校验.
    ///
    /// # 错误
    ///
    /// 输入乱序、有重叠、越出 `u32` 索引范围, 或强度为 NaN 时返回 [`MaskError::MalformedInput`].
    pub fn from_sorted_runs(runs: Vec<MaskRun>) -> MaskResult<Self> {
        let n = runs.len();
        canonicalize(runs, n)
    }

    /// 不做任何校验, 直接以 `runs` 作为掩膜的行程.
    ///
    /// 调用者必须保证 `runs` 已满足规范形式. 否则后续操作的结果未定义
    /// (但仍然是内存安全的). 该约束只在 debug 模式下检查.
    pub fn from_sorted_runs_unchecked(runs: Vec<MaskRun>) -> Self {
        debug_assert!(
            runs.iter().all(|r| !r.is_empty()),
            "empty run in unchecked input"
        );
        debug_assert!(
            runs.windows(2)
                .all(|w| w[0].compare(&w[1]).is_lt() && !w[0].overlaps(&w[1])),
            "unchecked input is not sorted or has overlaps"
        );
        Self::from_canonical(runs)
    }

    /// 由体素索引构建掩膜. 每个体素的强度均为 [`DEFAULT_FILL_INTENSITY`].
    ///
    /// # 错误
    ///
    /// 有重复索引时返回 [`MaskError::MalformedInput`].
    pub fn from_indices<I>(indices: I) -> MaskResult<Self>
    where
        I: IntoIterator<Item = MaskIndex>,
    {
        Self::from_weighted_indices(
            indices
                .into_iter()
                .map(|index| (index, DEFAULT_FILL_INTENSITY)),
        )
    }

    /// 由带强度的体素索引构建掩膜. 相邻且强度相同的体素共享一个行程.
    ///
    /// # 错误
    ///
    /// 有重复索引, 或强度为 NaN 时返回 [`MaskError::MalformedInput`].
    pub fn from_weighted_indices<I>(indices: I) -> MaskResult<Self>
    where
        I: IntoIterator<Item = (MaskIndex, f32)>,
    {
        let mut voxels: Vec<(MaskIndex, f32)> = indices.into_iter().collect();
        voxels.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        if let Some(w) = voxels.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(MaskError::MalformedInput(format!(
                "duplicate index {:?}",
                w[0].0
            )));
        }

        let mut builder = RunBuilder::new();
        for (index, intensity) in voxels {
            check_intensity(&index, intensity)?;
            builder.push_voxel(index, intensity);
        }
        Ok(builder.finish())
    }

    /// 由行程记录字节流 (格式见 [`crate::consts::RUN_RECORD_SIZE`]) 构建掩膜.
    /// 记录可以是任意顺序.
    pub fn from_data(data: &[u8]) -> MaskResult<Self> {
        Self::from_runs(codec::decode_runs(data)?)
    }

    /// 与 [`RoiMask::from_data`] 相同, 但要求记录已按规范顺序排列.
    pub fn from_sorted_data(data: &[u8]) -> MaskResult<Self> {
        Self::from_sorted_runs(codec::decode_runs(data)?)
    }

    /// 由索引记录字节流 (格式见 [`crate::consts::INDEX_RECORD_SIZE`]) 构建掩膜,
    /// 每个体素的强度均为 `intensity`.
    pub fn from_index_data(data: &[u8], intensity: f32) -> MaskResult<Self> {
        let indexes = codec::decode_indexes(data)?;
        Self::from_weighted_indices(indexes.into_iter().map(|i| (i, intensity)))
    }

    /// 掩膜的全部行程, 按规范顺序.
    #[inline]
    pub fn runs(&self) -> &[MaskRun] {
        &self.runs
    }

    /// 行程个数.
    #[inline]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// 体素个数, 即所有行程长度之和.
    #[inline]
    pub fn index_count(&self) -> u64 {
        self.runs.iter().map(MaskRun::index_count).sum()
    }

    /// 掩膜是否不含任何体素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// 全部体素索引, 按 `(z, y, x)` 升序. 首次调用时展开并缓存.
    ///
    /// 对很大的掩膜, 展开的代价可能远高于掩膜本身. 只需遍历时请使用 [`RoiMask::index_iter`].
    pub fn indexes(&self) -> &[MaskIndex] {
        self.indexes.get_or_init(|| {
            debug!("materializing {} indexes", self.index_count());
            self.index_iter().collect()
        })
    }

    /// 惰性迭代全部体素索引, 不做缓存.
    #[inline]
    pub fn index_iter(&self) -> impl Iterator<Item = MaskIndex> + '_ {
        self.runs.iter().flat_map(MaskRun::indexes)
    }

    /// 将掩膜编码为行程记录字节流.
    #[inline]
    pub fn to_data(&self) -> Vec<u8> {
        codec::encode_runs(&self.runs)
    }

    /// 将掩膜编码为索引记录字节流. 强度信息丢失.
    #[inline]
    pub fn to_index_data(&self) -> Vec<u8> {
        codec::encode_indexes(self.indexes())
    }

    /// 两个掩膜是否完全相同 (体素与强度均相同). 等价于 `==`.
    #[inline]
    pub fn is_equal_to_mask(&self, other: &RoiMask) -> bool {
        self == other
    }
}
