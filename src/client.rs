use std::collections::HashMap;

use x11rb::protocol::xproto::Window;

use crate::monitor::Monitor;

pub type TagMask = u32;

/// One managed top-level window. Clients are threaded through two
/// singly-linked lists per monitor: `next` orders the arrangement,
/// `stack_next` orders focus history. Both lists always hold the same set.
#[derive(Debug, Clone)]
pub struct Client {
    pub name: String,
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub old_x: i32,
    pub old_y: i32,
    pub old_w: i32,
    pub old_h: i32,
    pub base_w: i32,
    pub base_h: i32,
    pub inc_w: i32,
    pub inc_h: i32,
    pub max_w: i32,
    pub max_h: i32,
    pub min_w: i32,
    pub min_h: i32,
    pub border_width: i32,
    pub old_border_width: i32,
    pub tags: TagMask,
    pub is_fixed: bool,
    pub is_floating: bool,
    pub is_urgent: bool,
    pub never_focus: bool,
    pub is_fullscreen: bool,
    /// Floating state saved while fullscreen.
    pub old_state: bool,
    pub monitor_index: usize,
    pub next: Option<Window>,
    pub stack_next: Option<Window>,
    pub window: Window,
}

impl Client {
    pub fn new(window: Window, monitor_index: usize, tags: TagMask) -> Self {
        Self {
            name: String::new(),
            min_aspect: 0.0,
            max_aspect: 0.0,
            x: 0,
            y: 0,
            w: 1,
            h: 1,
            old_x: 0,
            old_y: 0,
            old_w: 1,
            old_h: 1,
            base_w: 0,
            base_h: 0,
            inc_w: 0,
            inc_h: 0,
            max_w: 0,
            max_h: 0,
            min_w: 0,
            min_h: 0,
            border_width: 0,
            old_border_width: 0,
            tags,
            is_fixed: false,
            is_floating: false,
            is_urgent: false,
            never_focus: false,
            is_fullscreen: false,
            old_state: false,
            monitor_index,
            next: None,
            stack_next: None,
            window,
        }
    }

    pub fn width_with_border(&self) -> i32 {
        self.w + 2 * self.border_width
    }

    pub fn height_with_border(&self) -> i32 {
        self.h + 2 * self.border_width
    }

    pub fn is_visible_on(&self, monitor: &Monitor) -> bool {
        self.tags & monitor.selected_tagset() != 0
    }

    pub fn toggle_tags(&mut self, mask: TagMask, all_tags: TagMask) -> bool {
        let toggled = self.tags ^ (mask & all_tags);
        if toggled == 0 {
            return false;
        }
        self.tags = toggled;
        true
    }

    /// One step of multi-key tag composition: union while a combo is in
    /// progress, plain assignment otherwise.
    pub fn combo_tags(&mut self, mask: TagMask, all_tags: TagMask, composing: bool) {
        if composing {
            self.tags |= mask & all_tags;
        } else {
            self.tags = mask & all_tags;
        }
    }

    /// ICCCM 4.1.2.3 normalization: aspect limits, resize increments, base
    /// size and min/max clamping. Position clamping against the monitor is
    /// the caller's business.
    pub fn adjust_to_hints(&self, mut w: i32, mut h: i32) -> (i32, i32) {
        let base_is_min = self.base_w == self.min_w && self.base_h == self.min_h;

        if !base_is_min {
            w -= self.base_w;
            h -= self.base_h;
        }

        if self.min_aspect > 0.0 && self.max_aspect > 0.0 {
            if self.max_aspect < w as f32 / h as f32 {
                w = (h as f32 * self.max_aspect + 0.5) as i32;
            } else if self.min_aspect < h as f32 / w as f32 {
                h = (w as f32 * self.min_aspect + 0.5) as i32;
            }
        }

        if base_is_min {
            // increment arithmetic needs the base removed
            w -= self.base_w;
            h -= self.base_h;
        }

        if self.inc_w > 0 {
            w -= w % self.inc_w;
        }
        if self.inc_h > 0 {
            h -= h % self.inc_h;
        }

        w = (w + self.base_w).max(self.min_w);
        h = (h + self.base_h).max(self.min_h);

        if self.max_w > 0 {
            w = w.min(self.max_w);
        }
        if self.max_h > 0 {
            h = h.min(self.max_h);
        }

        (w, h)
    }
}

/// Head insertion into the arrangement list.
pub fn attach(clients: &mut HashMap<Window, Client>, monitor: &mut Monitor, window: Window) {
    let head = monitor.clients_head;
    if let Some(client) = clients.get_mut(&window) {
        client.next = head;
        monitor.clients_head = Some(window);
    }
}

/// Head insertion into the focus stack.
pub fn attach_stack(clients: &mut HashMap<Window, Client>, monitor: &mut Monitor, window: Window) {
    let head = monitor.stack_head;
    if let Some(client) = clients.get_mut(&window) {
        client.stack_next = head;
        monitor.stack_head = Some(window);
    }
}

pub fn detach(clients: &mut HashMap<Window, Client>, monitor: &mut Monitor, window: Window) {
    let unlinked = clients.get(&window).and_then(|c| c.next);

    if monitor.clients_head == Some(window) {
        monitor.clients_head = unlinked;
    } else {
        let mut current = monitor.clients_head;
        while let Some(walk) = current {
            let next = clients.get(&walk).and_then(|c| c.next);
            if next == Some(window) {
                if let Some(previous) = clients.get_mut(&walk) {
                    previous.next = unlinked;
                }
                break;
            }
            current = next;
        }
    }

    if let Some(client) = clients.get_mut(&window) {
        client.next = None;
    }
}

/// Splice out of the focus stack. If the detached client was the monitor's
/// selection, the topmost visible survivor becomes the new selection.
pub fn detach_stack(clients: &mut HashMap<Window, Client>, monitor: &mut Monitor, window: Window) {
    let unlinked = clients.get(&window).and_then(|c| c.stack_next);

    if monitor.stack_head == Some(window) {
        monitor.stack_head = unlinked;
    } else {
        let mut current = monitor.stack_head;
        while let Some(walk) = current {
            let next = clients.get(&walk).and_then(|c| c.stack_next);
            if next == Some(window) {
                if let Some(previous) = clients.get_mut(&walk) {
                    previous.stack_next = unlinked;
                }
                break;
            }
            current = next;
        }
    }

    if let Some(client) = clients.get_mut(&window) {
        client.stack_next = None;
    }

    if monitor.sel == Some(window) {
        monitor.sel = topmost_visible(clients, monitor);
    }
}

/// First visible client on the monitor's focus stack.
pub fn topmost_visible(clients: &HashMap<Window, Client>, monitor: &Monitor) -> Option<Window> {
    let mut current = monitor.stack_head;
    while let Some(window) = current {
        let client = clients.get(&window)?;
        if client.is_visible_on(monitor) {
            return Some(window);
        }
        current = client.stack_next;
    }
    None
}

/// First visible, non-floating client at or after `start` in arrangement
/// order.
pub fn next_tiled(
    clients: &HashMap<Window, Client>,
    monitor: &Monitor,
    start: Option<Window>,
) -> Option<Window> {
    let mut current = start;
    while let Some(window) = current {
        let client = clients.get(&window)?;
        if !client.is_floating && client.is_visible_on(monitor) {
            return Some(window);
        }
        current = client.next;
    }
    None
}

/// Arrangement list, head first.
pub fn arrangement(clients: &HashMap<Window, Client>, monitor: &Monitor) -> Vec<Window> {
    let mut result = Vec::new();
    let mut current = monitor.clients_head;
    while let Some(window) = current {
        result.push(window);
        current = clients.get(&window).and_then(|c| c.next);
    }
    result
}

/// Focus stack, most recently focused first.
pub fn stack_order(clients: &HashMap<Window, Client>, monitor: &Monitor) -> Vec<Window> {
    let mut result = Vec::new();
    let mut current = monitor.stack_head;
    while let Some(window) = current {
        result.push(window);
        current = clients.get(&window).and_then(|c| c.stack_next);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Rect;

    fn test_monitor() -> Monitor {
        Monitor::new(
            0,
            Rect {
                x: 0,
                y: 0,
                w: 1920,
                h: 1080,
            },
            0.55,
            1,
            10,
        )
    }

    fn insert(clients: &mut HashMap<Window, Client>, monitor: &mut Monitor, window: Window) {
        clients.insert(window, Client::new(window, monitor.num, 1));
        attach(clients, monitor, window);
        attach_stack(clients, monitor, window);
    }

    #[test]
    fn attach_is_head_insertion() {
        let mut clients = HashMap::new();
        let mut monitor = test_monitor();
        insert(&mut clients, &mut monitor, 10);
        insert(&mut clients, &mut monitor, 11);
        insert(&mut clients, &mut monitor, 12);

        assert_eq!(arrangement(&clients, &monitor), vec![12, 11, 10]);
        assert_eq!(stack_order(&clients, &monitor), vec![12, 11, 10]);
    }

    #[test]
    fn detach_preserves_the_rest_of_the_list() {
        let mut clients = HashMap::new();
        let mut monitor = test_monitor();
        for window in [10, 11, 12] {
            insert(&mut clients, &mut monitor, window);
        }

        detach(&mut clients, &mut monitor, 11);
        assert_eq!(arrangement(&clients, &monitor), vec![12, 10]);

        detach(&mut clients, &mut monitor, 12);
        assert_eq!(arrangement(&clients, &monitor), vec![10]);

        detach(&mut clients, &mut monitor, 10);
        assert_eq!(arrangement(&clients, &monitor), Vec::<Window>::new());
    }

    #[test]
    fn detach_then_attach_restores_membership() {
        let mut clients = HashMap::new();
        let mut monitor = test_monitor();
        for window in [10, 11, 12] {
            insert(&mut clients, &mut monitor, window);
        }

        detach(&mut clients, &mut monitor, 10);
        attach(&mut clients, &mut monitor, 10);

        let mut members = arrangement(&clients, &monitor);
        members.sort_unstable();
        assert_eq!(members, vec![10, 11, 12]);
    }

    #[test]
    fn detach_stack_reselects_topmost_visible() {
        let mut clients = HashMap::new();
        let mut monitor = test_monitor();
        for window in [10, 11, 12] {
            insert(&mut clients, &mut monitor, window);
        }
        monitor.sel = Some(12);

        // 11 lives on a hidden tag, so it must be skipped over
        clients.get_mut(&11).unwrap().tags = 1 << 3;

        detach_stack(&mut clients, &mut monitor, 12);
        assert_eq!(monitor.sel, Some(10));
        assert_eq!(stack_order(&clients, &monitor), vec![11, 10]);
    }

    #[test]
    fn detach_stack_of_unselected_keeps_selection() {
        let mut clients = HashMap::new();
        let mut monitor = test_monitor();
        for window in [10, 11] {
            insert(&mut clients, &mut monitor, window);
        }
        monitor.sel = Some(11);

        detach_stack(&mut clients, &mut monitor, 10);
        assert_eq!(monitor.sel, Some(11));
    }

    #[test]
    fn tag_toggle_is_involutive_when_nonempty() {
        let all = (1 << 9) - 1;
        let mut client = Client::new(1, 0, 0b101);

        assert!(client.toggle_tags(1 << 1, all));
        assert!(client.toggle_tags(1 << 1, all));
        assert_eq!(client.tags, 0b101);

        assert!(!client.toggle_tags(0b101, all));
        assert_eq!(client.tags, 0b101);
    }

    #[test]
    fn combo_tags_assignment_masks_to_configured_tags() {
        let all = (1 << 9) - 1;
        let mut client = Client::new(1, 0, 1);

        client.combo_tags(1 << 2, all, false);
        assert_eq!(client.tags, 1 << 2);

        // a fresh assignment fully replaces the previous set, and bits
        // beyond the configured tags are masked off
        client.combo_tags((1 << 4) | (1 << 20), all, false);
        assert_eq!(client.tags, 1 << 4);
    }

    #[test]
    fn combo_tags_union_while_composing() {
        let all = (1 << 9) - 1;
        let mut client = Client::new(1, 0, 1);

        client.combo_tags(1 << 0, all, false);
        client.combo_tags(1 << 4, all, true);
        assert_eq!(client.tags, (1 << 0) | (1 << 4));

        client.combo_tags(1 << 2, all, false);
        assert_eq!(client.tags, 1 << 2);
    }

    #[test]
    fn next_tiled_skips_floating_and_hidden() {
        let mut clients = HashMap::new();
        let mut monitor = test_monitor();
        for window in [10, 11, 12] {
            insert(&mut clients, &mut monitor, window);
        }
        clients.get_mut(&12).unwrap().is_floating = true;
        clients.get_mut(&11).unwrap().tags = 1 << 5;

        let first = next_tiled(&clients, &monitor, monitor.clients_head);
        assert_eq!(first, Some(10));
        let after = clients.get(&10).unwrap().next;
        assert_eq!(next_tiled(&clients, &monitor, after), None);
    }

    #[test]
    fn hints_round_to_increments_above_base() {
        let mut client = Client::new(1, 0, 1);
        client.base_w = 2;
        client.base_h = 4;
        client.inc_w = 7;
        client.inc_h = 13;
        client.min_w = 10;
        client.min_h = 10;

        let (w, h) = client.adjust_to_hints(100, 100);
        assert_eq!((w - client.base_w) % client.inc_w, 0);
        assert_eq!((h - client.base_h) % client.inc_h, 0);
        assert!(w <= 100 && h <= 100);
        assert!(w >= client.min_w && h >= client.min_h);
    }

    #[test]
    fn hints_clamp_to_min_and_max() {
        let mut client = Client::new(1, 0, 1);
        client.min_w = 50;
        client.min_h = 40;
        client.max_w = 300;
        client.max_h = 200;

        assert_eq!(client.adjust_to_hints(10, 10), (50, 40));
        assert_eq!(client.adjust_to_hints(1000, 1000), (300, 200));
    }

    #[test]
    fn hints_respect_aspect_limits() {
        let mut client = Client::new(1, 0, 1);
        client.min_aspect = 1.0;
        client.max_aspect = 1.0;

        let (w, h) = client.adjust_to_hints(200, 100);
        assert_eq!(w, h);
    }
}
