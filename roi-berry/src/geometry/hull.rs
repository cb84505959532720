//! 掩膜凸包.
//!
//! 候选点先做两级约简: 每条扫描线只保留两端的体素, 每个 depth 切片再只保留这些端点的二维凸包顶点.
//! 约简后的点集用增量法求三维凸包. 体素中心是整数点, 全部判定都用 `i128` 精确计算,
//! 因此不存在浮点意义上的 "几乎共面".

use std::collections::HashSet;

use log::debug;
use nalgebra::{Point3, Vector3};

use crate::mask::line::Lines;
use crate::{AffineTransform, MaskError, MaskResult, RoiMask};

/// 判定点是否在凸包内时允许的距离误差.
const HULL_EPS: f64 = 1e-6;

type IPoint = [i64; 3];

/// 掩膜的凸包, 以三角面片表示.
///
/// 三维情形下每个面片 `[a, b, c]` 按右手法则给出的法向朝外.
/// 退化情形 (全部体素共面、共线或只有一个体素) 下, [`MaskHull::dimension`] 小于 3:
/// 共面时顶点按多边形顺序排列, 面片为扇形三角剖分; 共线时只有两个端点; 单点时只有一个顶点.
/// 后两种情形没有面片.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskHull {
    vertices: Vec<Point3<f64>>,
    faces: Vec<[u32; 3]>,
    dimension: u8,
}

impl MaskHull {
    /// 凸包顶点.
    #[inline]
    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// 三角面片, 元素为 [`MaskHull::vertices`] 的下标.
    #[inline]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// 凸包的维数, 取值 `0..=3`.
    #[inline]
    pub fn dimension(&self) -> u8 {
        self.dimension
    }

    fn face_points(&self, face: &[u32; 3]) -> [Point3<f64>; 3] {
        face.map(|i| self.vertices[i as usize])
    }

    /// 点 `p` 是否在凸包内 (含边界).
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        match self.dimension {
            0 => (self.vertices[0] - p).norm() <= HULL_EPS,
            1 => {
                let (a, b) = (self.vertices[0], self.vertices[1]);
                let ab = b - a;
                let t = ((p - a).dot(&ab) / ab.norm_squared()).clamp(0.0, 1.0);
                (a + ab * t - p).norm() <= HULL_EPS
            }
            2 => self.polygon_contains(p),
            _ => self.faces.iter().all(|f| {
                let [a, b, c] = self.face_points(f);
                let n = (b - a).cross(&(c - a));
                (p - a).dot(&n) <= HULL_EPS * n.norm()
            }),
        }
    }

    fn polygon_contains(&self, p: &Point3<f64>) -> bool {
        let normal: Vector3<f64> = self
            .faces
            .iter()
            .map(|f| {
                let [a, b, c] = self.face_points(f);
                (b - a).cross(&(c - a))
            })
            .sum();
        let len = normal.norm();
        let origin = self.vertices[0];
        if (p - origin).dot(&normal).abs() > HULL_EPS * len {
            return false;
        }
        let n = self.vertices.len();
        (0..n).all(|i| {
            let (a, b) = (self.vertices[i], self.vertices[(i + 1) % n]);
            let edge = b - a;
            edge.cross(&(p - a)).dot(&normal) >= -HULL_EPS * edge.norm() * len
        })
    }

    fn transformed(mut self, transform: &AffineTransform) -> Self {
        for v in self.vertices.iter_mut() {
            *v = transform.apply(v);
        }
        if transform.determinant() < 0.0 {
            for f in self.faces.iter_mut() {
                f.swap(1, 2);
            }
        }
        self
    }
}

#[inline]
fn sub(a: &IPoint, b: &IPoint) -> [i128; 3] {
    [
        (a[0] - b[0]) as i128,
        (a[1] - b[1]) as i128,
        (a[2] - b[2]) as i128,
    ]
}

#[inline]
fn cross(u: &[i128; 3], v: &[i128; 3]) -> [i128; 3] {
    [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ]
}

#[inline]
fn dot(u: &[i128; 3], v: &[i128; 3]) -> i128 {
    u[0] * v[0] + u[1] * v[1] + u[2] * v[2]
}

/// `d` 相对于三角形 `(a, b, c)` 右手法向的有向体积. 大于零表示 `d` 在法向一侧.
#[inline]
fn orient(a: &IPoint, b: &IPoint, c: &IPoint, d: &IPoint) -> i128 {
    dot(&cross(&sub(b, a), &sub(c, a)), &sub(d, a))
}

/// 二维 cross: 在平面 `(ax, ay)` 上 `o→a` 与 `o→b` 的叉积.
#[inline]
fn cross_2d(o: &IPoint, a: &IPoint, b: &IPoint, ax: usize, ay: usize) -> i128 {
    let (ux, uy) = ((a[ax] - o[ax]) as i128, (a[ay] - o[ay]) as i128);
    let (vx, vy) = ((b[ax] - o[ax]) as i128, (b[ay] - o[ay]) as i128);
    ux * vy - uy * vx
}

/// 在坐标平面 `(ax, ay)` 上求点集投影的二维凸包 (Andrew 单调链), 去掉共线点.
///
/// 结果在该平面上按逆时针排列. 调用者需保证投影是单射.
fn hull_2d(mut points: Vec<IPoint>, ax: usize, ay: usize) -> Vec<IPoint> {
    points.sort_unstable_by_key(|p| (p[ax], p[ay]));
    points.dedup_by_key(|p| (p[ax], p[ay]));
    if points.len() <= 2 {
        return points;
    }

    let mut lower: Vec<IPoint> = Vec::with_capacity(points.len());
    for p in points.iter() {
        while lower.len() >= 2 && cross_2d(&lower[lower.len() - 2], &lower[lower.len() - 1], p, ax, ay) <= 0 {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<IPoint> = Vec::with_capacity(points.len());
    for p in points.iter().rev() {
        while upper.len() >= 2 && cross_2d(&upper[upper.len() - 2], &upper[upper.len() - 1], p, ax, ay) <= 0 {
            upper.pop();
        }
        upper.push(*p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// 约简后的候选点: 每个 depth 切片上扫描线端点的二维凸包顶点.
fn candidates(mask: &RoiMask) -> Vec<IPoint> {
    let mut ans = Vec::new();
    let mut slice: Vec<IPoint> = Vec::new();
    let mut cur_depth = None;
    for ((z, y), runs) in Lines::new(mask.runs()) {
        if cur_depth != Some(z) {
            ans.extend(hull_2d(std::mem::take(&mut slice), 0, 1));
            cur_depth = Some(z);
        }
        // 扫描线非空; 首行程的起点和末行程的终点即为两端.
        if let (Some(first), Some(last)) = (runs.first(), runs.last()) {
            slice.push([first.width_start as i64, y as i64, z as i64]);
            slice.push([last.width_end() as i64 - 1, y as i64, z as i64]);
        }
    }
    ans.extend(hull_2d(slice, 0, 1));
    ans
}

/// 增量法三维凸包. 输入不含重复点, 且 `p0..p3` 不共面.
fn hull_3d(points: &[IPoint], init: [usize; 4]) -> (Vec<usize>, Vec<[usize; 3]>) {
    let [i0, i1, i2, i3] = init;
    let inside = |a: usize, b: usize, c: usize, d: usize| -> [usize; 3] {
        if orient(&points[a], &points[b], &points[c], &points[d]) > 0 {
            [a, c, b]
        } else {
            [a, b, c]
        }
    };
    let mut faces: Vec<[usize; 3]> = vec![
        inside(i0, i1, i2, i3),
        inside(i0, i1, i3, i2),
        inside(i0, i2, i3, i1),
        inside(i1, i2, i3, i0),
    ];

    for (p, point) in points.iter().enumerate() {
        if init.contains(&p) {
            continue;
        }
        let (visible, kept): (Vec<[usize; 3]>, Vec<[usize; 3]>) = faces
            .into_iter()
            .partition(|f| orient(&points[f[0]], &points[f[1]], &points[f[2]], point) > 0);
        faces = kept;
        if visible.is_empty() {
            continue;
        }

        let edges: HashSet<(usize, usize)> = visible
            .iter()
            .flat_map(|f| [(f[0], f[1]), (f[1], f[2]), (f[2], f[0])])
            .collect();
        for &(u, v) in edges.iter() {
            if !edges.contains(&(v, u)) {
                faces.push([u, v, p]);
            }
        }
    }

    // 新点与某条地平线边共线时会产生零面积面片, 它们对凸包没有贡献.
    faces.retain(|f| cross(&sub(&points[f[1]], &points[f[0]]), &sub(&points[f[2]], &points[f[0]])) != [0; 3]);

    let mut used: Vec<usize> = faces.iter().flatten().copied().collect();
    used.sort_unstable();
    used.dedup();
    (used, faces)
}

fn to_point(p: &IPoint) -> Point3<f64> {
    Point3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

/// 在整数点集上求凸包 (含退化情形).
fn exact_hull(points: Vec<IPoint>) -> MaskHull {
    let p0 = points[0];
    let Some(i1) = points.iter().position(|p| *p != p0) else {
        return MaskHull {
            vertices: vec![to_point(&p0)],
            faces: Vec::new(),
            dimension: 0,
        };
    };
    let dir = sub(&points[i1], &p0);

    let Some(i2) = points
        .iter()
        .position(|p| cross(&dir, &sub(p, &p0)) != [0; 3])
    else {
        let key = |p: &IPoint| dot(&dir, &sub(p, &p0));
        let (mut lo, mut hi) = (&p0, &p0);
        for p in points.iter() {
            if key(p) < key(lo) {
                lo = p;
            }
            if key(p) > key(hi) {
                hi = p;
            }
        }
        return MaskHull {
            vertices: vec![to_point(lo), to_point(hi)],
            faces: Vec::new(),
            dimension: 1,
        };
    };
    let normal = cross(&dir, &sub(&points[i2], &p0));

    let Some(i3) = points.iter().position(|p| dot(&normal, &sub(p, &p0)) != 0) else {
        // 投影到法向分量最大的坐标轴以外的两个轴上.
        let drop = (0..3).max_by_key(|&k| normal[k].abs()).unwrap_or(2);
        let (ax, ay) = match drop {
            0 => (1, 2),
            1 => (2, 0),
            _ => (0, 1),
        };
        let polygon = hull_2d(points, ax, ay);
        let faces = (1..polygon.len().saturating_sub(1))
            .map(|i| [0, i as u32, i as u32 + 1])
            .collect();
        return MaskHull {
            vertices: polygon.iter().map(to_point).collect(),
            faces,
            dimension: 2,
        };
    };

    let (used, faces) = hull_3d(&points, [0, i1, i2, i3]);
    let mut remap = vec![u32::MAX; points.len()];
    for (new, &old) in used.iter().enumerate() {
        remap[old] = new as u32;
    }
    MaskHull {
        vertices: used.iter().map(|&i| to_point(&points[i])).collect(),
        faces: faces.iter().map(|f| f.map(|i| remap[i])).collect(),
        dimension: 3,
    }
}

impl RoiMask {
    /// 掩膜全部体素中心的凸包.
    ///
    /// 给定 `transform` 时, 顶点在求得凸包后再经其变换 (仿射变换保持凸性);
    /// 若变换改变定向, 面片的绕向会随之翻转以保持法向朝外.
    ///
    /// # 错误
    ///
    /// 空掩膜返回 [`MaskError::UndefinedResult`].
    pub fn convex_hull(&self, transform: Option<&AffineTransform>) -> MaskResult<MaskHull> {
        if self.is_empty() {
            return Err(MaskError::UndefinedResult("convex hull of an empty mask"));
        }
        let points = candidates(self);
        debug!(
            "convex hull: {} candidates from {} runs",
            points.len(),
            self.run_count()
        );
        let hull = exact_hull(points);
        Ok(match transform {
            Some(t) => hull.transformed(t),
            None => hull,
        })
    }
}
