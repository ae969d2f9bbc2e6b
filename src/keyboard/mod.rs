pub mod keysyms;

use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::errors::WmResult;
use keysyms::Keysym;

/// Everything a binding can do. Keys and mouse buttons share this table,
/// the way the handler dispatch shares one set of operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Spawn,
    FocusStack,
    IncNMaster,
    SetMFact,
    Zoom,
    ToggleFullscreen,
    KillClient,
    ToggleFloating,
    View,
    ComboView,
    ToggleView,
    ComboTag,
    ToggleTag,
    FocusMon,
    TagMon,
    MoveMouse,
    ResizeMouse,
    Quit,
}

#[derive(Debug, Clone, Copy)]
pub enum Arg {
    None,
    Int(i32),
    Float(f32),
    Mask(crate::client::TagMask),
    Cmd(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct KeyBinding {
    pub mods: u16,
    pub keysym: Keysym,
    pub action: Action,
    pub arg: Arg,
}

impl KeyBinding {
    pub const fn new(mods: u16, keysym: Keysym, action: Action, arg: Arg) -> Self {
        Self {
            mods,
            keysym,
            action,
            arg,
        }
    }
}

/// Snapshot of the server's keycode-to-keysym table. Rebuilt whenever a
/// MappingNotify reports a keyboard change.
pub struct KeyboardMapping {
    min_keycode: u8,
    keysyms_per_keycode: u8,
    keysyms: Vec<u32>,
}

impl KeyboardMapping {
    pub fn refresh(connection: &RustConnection) -> WmResult<Self> {
        let setup = x11rb::connection::Connection::setup(connection);
        let min_keycode = setup.min_keycode;
        let max_keycode = setup.max_keycode;

        let reply = connection
            .get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)?
            .reply()?;

        Ok(Self {
            min_keycode,
            keysyms_per_keycode: reply.keysyms_per_keycode,
            keysyms: reply.keysyms,
        })
    }

    /// Group 0, unshifted column.
    pub fn keycode_to_keysym(&self, keycode: u8) -> Keysym {
        let index =
            keycode.saturating_sub(self.min_keycode) as usize * self.keysyms_per_keycode as usize;
        self.keysyms.get(index).copied().unwrap_or(0)
    }

    pub fn keysym_to_keycode(&self, keysym: Keysym) -> Option<u8> {
        if keysym == 0 || self.keysyms_per_keycode == 0 {
            return None;
        }
        self.keysyms
            .chunks(self.keysyms_per_keycode as usize)
            .position(|columns| columns.contains(&keysym))
            .map(|row| self.min_keycode + row as u8)
    }
}

/// Locate which modifier bit Num_Lock currently occupies.
pub fn numlock_mask(connection: &RustConnection, mapping: &KeyboardMapping) -> WmResult<u16> {
    let Some(numlock_code) = mapping.keysym_to_keycode(keysyms::XK_NUM_LOCK) else {
        return Ok(0);
    };

    let reply = connection.get_modifier_mapping()?.reply()?;
    let per_modifier = reply.keycodes.len() / 8;
    if per_modifier == 0 {
        return Ok(0);
    }

    for (modifier, codes) in reply.keycodes.chunks(per_modifier).enumerate() {
        if codes.contains(&numlock_code) {
            return Ok(1 << modifier);
        }
    }

    Ok(0)
}

/// Strip Lock and Num_Lock, keep only the real modifier bits.
pub fn clean_mask(state: u16, numlock: u16) -> u16 {
    let modifiers = u16::from(ModMask::SHIFT)
        | u16::from(ModMask::CONTROL)
        | u16::from(ModMask::M1)
        | u16::from(ModMask::M2)
        | u16::from(ModMask::M3)
        | u16::from(ModMask::M4)
        | u16::from(ModMask::M5);
    state & !(numlock | u16::from(ModMask::LOCK)) & modifiers
}

/// The modifier combinations a grab has to cover so bindings keep working
/// with Lock or Num_Lock held.
pub fn ignored_modifiers(numlock: u16) -> [u16; 4] {
    let lock = u16::from(ModMask::LOCK);
    [0, lock, numlock, numlock | lock]
}

pub fn grab_keys(
    connection: &RustConnection,
    root: Window,
    keys: &[KeyBinding],
    numlock: u16,
    mapping: &KeyboardMapping,
) -> WmResult<()> {
    connection.ungrab_key(Grab::ANY, root, ModMask::ANY)?;

    for key in keys {
        let Some(code) = mapping.keysym_to_keycode(key.keysym) else {
            continue;
        };
        for extra in ignored_modifiers(numlock) {
            connection.grab_key(
                true,
                root,
                (key.mods | extra).into(),
                code,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping_with(rows: &[&[u32]]) -> KeyboardMapping {
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut keysyms = Vec::new();
        for row in rows {
            for column in 0..width {
                keysyms.push(row.get(column).copied().unwrap_or(0));
            }
        }
        KeyboardMapping {
            min_keycode: 8,
            keysyms_per_keycode: width as u8,
            keysyms,
        }
    }

    #[test]
    fn keycode_resolution_uses_group_zero() {
        let mapping = mapping_with(&[&[keysyms::XK_D, 0x44], &[keysyms::XK_B, 0x42]]);
        assert_eq!(mapping.keycode_to_keysym(8), keysyms::XK_D);
        assert_eq!(mapping.keycode_to_keysym(9), keysyms::XK_B);
        assert_eq!(mapping.keycode_to_keysym(200), 0);
    }

    #[test]
    fn keysym_lookup_searches_all_columns() {
        let mapping = mapping_with(&[&[keysyms::XK_D, 0x44], &[keysyms::XK_B, 0x42]]);
        assert_eq!(mapping.keysym_to_keycode(0x42), Some(9));
        assert_eq!(mapping.keysym_to_keycode(keysyms::XK_Q), None);
    }

    #[test]
    fn clean_mask_strips_lock_bits() {
        let numlock = u16::from(ModMask::M2);
        let state =
            u16::from(ModMask::M4) | u16::from(ModMask::LOCK) | numlock | u16::from(ModMask::SHIFT);
        assert_eq!(
            clean_mask(state, numlock),
            u16::from(ModMask::M4) | u16::from(ModMask::SHIFT)
        );
    }
}
