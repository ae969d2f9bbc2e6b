//! Master-stack tiling arithmetic. Pure geometry: the caller feeds the
//! resulting rectangles through size-hint normalization before issuing
//! configure requests.

use crate::monitor::Rect;

pub struct TileParams {
    pub work: Rect,
    pub gappx: i32,
    pub mfact: f32,
    pub nmaster: i32,
}

/// Compute one rectangle per tiled client, masters first. The first
/// `nmaster` clients split the left column of `mfact * work.w`, the rest
/// split the right column; `gappx` pads the work-area interior and the
/// space between clients. Every dimension is floored at 1.
pub fn master_stack(params: &TileParams, border_widths: &[i32]) -> Vec<Rect> {
    let n = border_widths.len() as i32;
    if n == 0 {
        return Vec::new();
    }

    let work = params.work;
    let gappx = params.gappx;
    let nmaster = params.nmaster.max(0);

    let master_width = if n > nmaster {
        if nmaster > 0 {
            (work.w as f32 * params.mfact) as i32
        } else {
            0
        }
    } else {
        work.w - gappx
    };

    let mut master_y = gappx;
    let mut stack_y = gappx;
    let mut rects = Vec::with_capacity(border_widths.len());

    for (index, &bw) in border_widths.iter().enumerate() {
        let i = index as i32;
        let rect = if i < nmaster {
            let slot_h = (work.h - master_y) / (n.min(nmaster) - i) - gappx;
            Rect {
                x: work.x + gappx,
                y: work.y + master_y,
                w: (master_width - 2 * bw - gappx).max(1),
                h: (slot_h - 2 * bw).max(1),
            }
        } else {
            let slot_h = (work.h - stack_y) / (n - i) - gappx;
            Rect {
                x: work.x + master_width + gappx,
                y: work.y + stack_y,
                w: (work.w - master_width - 2 * bw - 2 * gappx).max(1),
                h: (slot_h - 2 * bw).max(1),
            }
        };

        let occupied = rect.h + 2 * bw;
        if i < nmaster {
            if master_y + occupied < work.h {
                master_y += occupied + gappx;
            }
        } else if stack_y + occupied < work.h {
            stack_y += occupied + gappx;
        }

        rects.push(rect);
    }

    rects
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(w: i32, h: i32, gappx: i32, mfact: f32, nmaster: i32) -> TileParams {
        TileParams {
            work: Rect { x: 0, y: 0, w, h },
            gappx,
            mfact,
            nmaster,
        }
    }

    fn contained(outer: &Rect, inner: &Rect, bw: i32) -> bool {
        inner.x >= outer.x
            && inner.y >= outer.y
            && inner.x + inner.w + 2 * bw <= outer.x + outer.w
            && inner.y + inner.h + 2 * bw <= outer.y + outer.h
    }

    #[test]
    fn no_clients_yields_no_rectangles() {
        assert!(master_stack(&params(1920, 1080, 10, 0.55, 1), &[]).is_empty());
    }

    #[test]
    fn master_and_stack_split_a_full_hd_monitor() {
        let rects = master_stack(&params(1920, 1080, 10, 0.55, 1), &[0, 0]);

        let master = rects[0];
        assert_eq!((master.x, master.y, master.w, master.h), (10, 10, 1046, 1060));

        let stack = rects[1];
        assert_eq!((stack.x, stack.y, stack.w, stack.h), (1066, 10, 844, 1060));

        let work = Rect {
            x: 0,
            y: 0,
            w: 1920,
            h: 1080,
        };
        assert!(contained(&work, &master, 0));
        assert!(contained(&work, &stack, 0));
        // master and stack columns do not overlap
        assert!(master.x + master.w <= stack.x);
    }

    #[test]
    fn single_client_spans_the_work_width() {
        let rects = master_stack(&params(1920, 1080, 10, 0.55, 1), &[0]);
        let only = rects[0];
        assert_eq!((only.x, only.y), (10, 10));
        assert_eq!(only.w, 1900);
        assert_eq!(only.h, 1060);
    }

    #[test]
    fn zero_masters_gives_the_stack_everything() {
        let rects = master_stack(&params(1920, 1080, 10, 0.55, 0), &[0]);
        let only = rects[0];
        assert_eq!(only.x, 10);
        assert_eq!(only.w, 1920 - 20);
    }

    #[test]
    fn masters_divide_the_column_evenly_with_gaps() {
        let rects = master_stack(&params(1000, 900, 10, 0.5, 2), &[0, 0, 0]);

        // two masters stacked on the left, one stack client on the right
        assert_eq!(rects[0].x, rects[1].x);
        assert!(rects[2].x > rects[0].x);
        assert_eq!(rects[1].y, rects[0].y + rects[0].h + 10);

        let work = Rect {
            x: 0,
            y: 0,
            w: 1000,
            h: 900,
        };
        for rect in &rects {
            assert!(contained(&work, rect, 0));
        }
    }

    #[test]
    fn borders_are_subtracted_from_each_slot() {
        let with_borders = master_stack(&params(1920, 1080, 10, 0.55, 1), &[2, 2]);
        let without = master_stack(&params(1920, 1080, 10, 0.55, 1), &[0, 0]);
        assert_eq!(with_borders[0].w, without[0].w - 4);
        assert_eq!(with_borders[0].h, without[0].h - 4);
    }

    #[test]
    fn extreme_shrink_floors_dimensions_at_one() {
        let rects = master_stack(&params(8, 8, 10, 0.55, 1), &[1, 1]);
        for rect in rects {
            assert!(rect.w >= 1);
            assert!(rect.h >= 1);
        }
    }

    #[test]
    fn work_area_offset_shifts_every_rectangle() {
        let shifted = master_stack(
            &TileParams {
                work: Rect {
                    x: 1920,
                    y: 24,
                    w: 1280,
                    h: 1000,
                },
                gappx: 5,
                mfact: 0.6,
                nmaster: 1,
            },
            &[1, 1],
        );
        for rect in &shifted {
            assert!(rect.x >= 1920 + 5);
            assert!(rect.y >= 24 + 5);
        }
    }
}
