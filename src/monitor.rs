use std::collections::HashMap;

use x11rb::protocol::xinerama::ConnectionExt as _;
use x11rb::protocol::xproto::Window;
use x11rb::rust_connection::RustConnection;

use crate::client::{self, Client, TagMask};
use crate::errors::WmResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.y + self.h
    }

    pub fn intersection_area(&self, other: &Rect) -> i32 {
        let width = 0.max((self.x + self.w).min(other.x + other.w) - self.x.max(other.x));
        let height = 0.max((self.y + self.h).min(other.y + other.h) - self.y.max(other.y));
        width * height
    }
}

/// One unique screen rectangle. The work area is the screen minus the band
/// reserved for an externally-owned status bar.
#[derive(Debug, Clone)]
pub struct Monitor {
    pub num: usize,
    pub mfact: f32,
    pub nmaster: i32,
    pub gappx: i32,
    /// Bar band: y position and height. Zero height when no bar is mapped.
    pub by: i32,
    pub bh: i32,
    pub mx: i32,
    pub my: i32,
    pub mw: i32,
    pub mh: i32,
    pub wx: i32,
    pub wy: i32,
    pub ww: i32,
    pub wh: i32,
    pub seltags: usize,
    pub tagset: [TagMask; 2],
    pub clients_head: Option<Window>,
    pub stack_head: Option<Window>,
    pub sel: Option<Window>,
    pub bar_window: Option<Window>,
    pub tray_window: Option<Window>,
}

impl Monitor {
    pub fn new(num: usize, rect: Rect, mfact: f32, nmaster: i32, gappx: i32) -> Self {
        Self {
            num,
            mfact,
            nmaster,
            gappx,
            by: 0,
            bh: 0,
            mx: rect.x,
            my: rect.y,
            mw: rect.w,
            mh: rect.h,
            wx: rect.x,
            wy: rect.y,
            ww: rect.w,
            wh: rect.h,
            seltags: 0,
            tagset: [1, 1],
            clients_head: None,
            stack_head: None,
            sel: None,
            bar_window: None,
            tray_window: None,
        }
    }

    pub fn screen_rect(&self) -> Rect {
        Rect {
            x: self.mx,
            y: self.my,
            w: self.mw,
            h: self.mh,
        }
    }

    pub fn work_rect(&self) -> Rect {
        Rect {
            x: self.wx,
            y: self.wy,
            w: self.ww,
            h: self.wh,
        }
    }

    pub fn selected_tagset(&self) -> TagMask {
        self.tagset[self.seltags]
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.screen_rect().contains_point(x, y)
    }

    /// Recompute the work area from the screen rectangle and the bar band.
    /// The bar occupies the top of the monitor.
    pub fn update_bar_pos(&mut self) {
        self.wx = self.mx;
        self.ww = self.mw;
        self.wy = self.my;
        self.wh = self.mh - self.bh;
        self.by = self.wy;
        self.wy += self.bh;
    }

    pub fn set_geometry(&mut self, rect: Rect) {
        self.mx = rect.x;
        self.my = rect.y;
        self.mw = rect.w;
        self.mh = rect.h;
        self.update_bar_pos();
    }

    /// Switch to `mask`, remembering the previous view in the inactive
    /// tagset slot. A no-op when `mask` is already the active view.
    pub fn view(&mut self, mask: TagMask, all_tags: TagMask) -> bool {
        if mask & all_tags == self.selected_tagset() {
            return false;
        }
        self.seltags ^= 1;
        if mask & all_tags != 0 {
            self.tagset[self.seltags] = mask & all_tags;
        }
        true
    }

    /// XOR `mask` into the active view, refusing an empty result.
    pub fn toggle_view(&mut self, mask: TagMask, all_tags: TagMask) -> bool {
        let toggled = self.selected_tagset() ^ (mask & all_tags);
        if toggled == 0 {
            return false;
        }
        self.tagset[self.seltags] = toggled;
        true
    }

    /// One step of multi-key view composition: while a combo is in
    /// progress the mask unions into the active view, otherwise this
    /// behaves like a fresh `view`.
    pub fn combo_view(&mut self, mask: TagMask, all_tags: TagMask, composing: bool) {
        if composing {
            self.tagset[self.seltags] |= mask & all_tags;
        } else {
            self.seltags ^= 1;
            if mask & all_tags != 0 {
                self.tagset[self.seltags] = mask & all_tags;
            }
        }
    }
}

/// Collapse raw Xinerama screens to unique geometries, preserving order.
pub fn dedup_geometries(raw: &[Rect]) -> Vec<Rect> {
    let mut unique: Vec<Rect> = Vec::with_capacity(raw.len());
    for rect in raw {
        if !unique.contains(rect) {
            unique.push(*rect);
        }
    }
    unique
}

/// Monitor with the largest intersection with `rect`; falls back to the
/// currently selected monitor on ties at zero.
pub fn rect_to_monitor(monitors: &[Monitor], rect: Rect, selected: usize) -> usize {
    let mut best = selected;
    let mut best_area = 0;
    for (index, monitor) in monitors.iter().enumerate() {
        let area = monitor.screen_rect().intersection_area(&rect);
        if area > best_area {
            best_area = area;
            best = index;
        }
    }
    best
}

/// Query the Xinerama extension for active screens. Falls back to the
/// whole-screen rectangle when the extension is inactive.
pub fn query_screens(connection: &RustConnection, fallback: Rect) -> WmResult<Vec<Rect>> {
    let whole_screen = || vec![fallback];

    let active = connection
        .xinerama_is_active()
        .ok()
        .and_then(|cookie| cookie.reply().ok())
        .is_some_and(|reply| reply.state != 0);

    if !active {
        return Ok(whole_screen());
    }

    let reply = connection.xinerama_query_screens()?.reply()?;
    let screens: Vec<Rect> = reply
        .screen_info
        .iter()
        .map(|info| Rect {
            x: info.x_org as i32,
            y: info.y_org as i32,
            w: info.width as i32,
            h: info.height as i32,
        })
        .collect();

    if screens.is_empty() {
        return Ok(whole_screen());
    }
    Ok(screens)
}

/// Bring the monitor list in line with the unique screen geometries.
/// Surplus monitors are removed from the tail and their clients migrate to
/// the head monitor, keeping their tag masks. Returns whether anything
/// changed.
pub fn reconcile(
    monitors: &mut Vec<Monitor>,
    clients: &mut HashMap<Window, Client>,
    unique: &[Rect],
    mfact: f32,
    nmaster: i32,
    gappx: i32,
) -> bool {
    let mut dirty = false;
    let known = monitors.len();

    if known <= unique.len() {
        for _ in known..unique.len() {
            let num = monitors.len();
            monitors.push(Monitor::new(num, unique[num], mfact, nmaster, gappx));
        }
        for (index, monitor) in monitors.iter_mut().enumerate() {
            if index >= known || monitor.screen_rect() != unique[index] {
                dirty = true;
                monitor.num = index;
                monitor.set_geometry(unique[index]);
            }
        }
    } else {
        while monitors.len() > unique.len() {
            let Some(mut removed) = monitors.pop() else {
                break;
            };
            dirty = true;

            while let Some(window) = removed.clients_head {
                client::detach(clients, &mut removed, window);
                client::detach_stack(clients, &mut removed, window);
                if let Some(moved) = clients.get_mut(&window) {
                    moved.monitor_index = 0;
                }
                let head = &mut monitors[0];
                client::attach(clients, head, window);
                client::attach_stack(clients, head, window);
            }
        }
        for (index, monitor) in monitors.iter_mut().enumerate() {
            if monitor.screen_rect() != unique[index] {
                monitor.num = index;
                monitor.set_geometry(unique[index]);
            }
        }
    }

    dirty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{arrangement, stack_order};

    const ALL_TAGS: TagMask = (1 << 9) - 1;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rect {
        Rect { x, y, w, h }
    }

    fn monitor_at(num: usize, r: Rect) -> Monitor {
        Monitor::new(num, r, 0.55, 1, 10)
    }

    #[test]
    fn dedup_collapses_identical_geometries() {
        let screens = [
            rect(0, 0, 1920, 1080),
            rect(0, 0, 1920, 1080),
            rect(1920, 0, 1280, 1024),
        ];
        let unique = dedup_geometries(&screens);
        assert_eq!(
            unique,
            vec![rect(0, 0, 1920, 1080), rect(1920, 0, 1280, 1024)]
        );
    }

    #[test]
    fn view_remembers_previous_tagset() {
        let mut monitor = monitor_at(0, rect(0, 0, 1920, 1080));

        assert!(monitor.view(1 << 2, ALL_TAGS));
        assert_eq!(monitor.selected_tagset(), 1 << 2);

        // viewing the active mask again changes nothing
        assert!(!monitor.view(1 << 2, ALL_TAGS));

        // an empty mask flips back to the previous view
        assert!(monitor.view(0, ALL_TAGS));
        assert_eq!(monitor.selected_tagset(), 1);

        assert!(monitor.view(0, ALL_TAGS));
        assert_eq!(monitor.selected_tagset(), 1 << 2);
    }

    #[test]
    fn toggle_view_is_involutive_and_refuses_empty() {
        let mut monitor = monitor_at(0, rect(0, 0, 1920, 1080));

        assert!(monitor.toggle_view(1 << 3, ALL_TAGS));
        assert_eq!(monitor.selected_tagset(), 1 | 1 << 3);
        assert!(monitor.toggle_view(1 << 3, ALL_TAGS));
        assert_eq!(monitor.selected_tagset(), 1);

        assert!(!monitor.toggle_view(1, ALL_TAGS));
        assert_eq!(monitor.selected_tagset(), 1);
    }

    #[test]
    fn combo_view_unions_while_composing() {
        let mut monitor = monitor_at(0, rect(0, 0, 1920, 1080));

        // press Mod+1, then Mod+3 without releasing the modifier
        monitor.combo_view(1 << 0, ALL_TAGS, false);
        monitor.combo_view(1 << 2, ALL_TAGS, true);
        assert_eq!(monitor.selected_tagset(), 0b101);

        // a fresh combo replaces instead of extending
        monitor.combo_view(1 << 1, ALL_TAGS, false);
        assert_eq!(monitor.selected_tagset(), 1 << 1);
    }

    #[test]
    fn bar_band_is_subtracted_from_work_area() {
        let mut monitor = monitor_at(0, rect(0, 0, 1920, 1080));
        monitor.bh = 24;
        monitor.update_bar_pos();

        assert_eq!(monitor.by, 0);
        assert_eq!(monitor.wy, 24);
        assert_eq!(monitor.wh, 1056);
        assert_eq!(monitor.wx, 0);
        assert_eq!(monitor.ww, 1920);

        monitor.bh = 0;
        monitor.update_bar_pos();
        assert_eq!(monitor.work_rect(), monitor.screen_rect());
    }

    #[test]
    fn rect_to_monitor_maximizes_intersection() {
        let monitors = vec![
            monitor_at(0, rect(0, 0, 1920, 1080)),
            monitor_at(1, rect(1920, 0, 1280, 1024)),
        ];

        assert_eq!(rect_to_monitor(&monitors, rect(100, 100, 200, 200), 0), 0);
        assert_eq!(rect_to_monitor(&monitors, rect(2000, 50, 300, 300), 0), 1);
        // straddling: most of the area lies on the second monitor
        assert_eq!(rect_to_monitor(&monitors, rect(1900, 0, 200, 200), 0), 1);
        // disjoint: fall back to the selected monitor
        assert_eq!(rect_to_monitor(&monitors, rect(9000, 9000, 10, 10), 1), 1);
    }

    #[test]
    fn reconcile_appends_new_monitors() {
        let mut monitors = vec![monitor_at(0, rect(0, 0, 1920, 1080))];
        let mut clients = HashMap::new();
        let unique = [rect(0, 0, 1920, 1080), rect(1920, 0, 1280, 1024)];

        let dirty = reconcile(&mut monitors, &mut clients, &unique, 0.55, 1, 10);
        assert!(dirty);
        assert_eq!(monitors.len(), 2);
        assert_eq!(monitors[1].screen_rect(), unique[1]);
        assert_eq!(monitors[1].num, 1);
    }

    #[test]
    fn reconcile_migrates_clients_from_removed_monitors() {
        let mut monitors = vec![
            monitor_at(0, rect(0, 0, 1920, 1080)),
            monitor_at(1, rect(1920, 0, 1280, 1024)),
        ];
        let mut clients = HashMap::new();

        clients.insert(10, Client::new(10, 0, 1));
        client::attach(&mut clients, &mut monitors[0], 10);
        client::attach_stack(&mut clients, &mut monitors[0], 10);

        for (window, tags) in [(20, 1 << 4), (21, 0b11)] {
            clients.insert(window, Client::new(window, 1, tags));
            client::attach(&mut clients, &mut monitors[1], window);
            client::attach_stack(&mut clients, &mut monitors[1], window);
        }

        let unique = [rect(0, 0, 1920, 1080)];
        let dirty = reconcile(&mut monitors, &mut clients, &unique, 0.55, 1, 10);

        assert!(dirty);
        assert_eq!(monitors.len(), 1);

        let mut members = arrangement(&clients, &monitors[0]);
        members.sort_unstable();
        assert_eq!(members, vec![10, 20, 21]);

        let mut stacked = stack_order(&clients, &monitors[0]);
        stacked.sort_unstable();
        assert_eq!(stacked, vec![10, 20, 21]);

        // migrated clients keep their tags and point at the head monitor
        assert_eq!(clients[&20].tags, 1 << 4);
        assert_eq!(clients[&21].tags, 0b11);
        assert_eq!(clients[&20].monitor_index, 0);
        assert_eq!(clients[&10].monitor_index, 0);
    }

    #[test]
    fn reconcile_marks_changed_geometry_dirty() {
        let mut monitors = vec![monitor_at(0, rect(0, 0, 1920, 1080))];
        let mut clients = HashMap::new();

        let unchanged = [rect(0, 0, 1920, 1080)];
        assert!(!reconcile(
            &mut monitors,
            &mut clients,
            &unchanged,
            0.55,
            1,
            10
        ));

        let grown = [rect(0, 0, 2560, 1440)];
        assert!(reconcile(&mut monitors, &mut clients, &grown, 0.55, 1, 10));
        assert_eq!(monitors[0].screen_rect(), grown[0]);
        assert_eq!(monitors[0].work_rect(), grown[0]);
    }
}
