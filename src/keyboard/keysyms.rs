//! The subset of X keysym values the default bindings refer to.

pub type Keysym = u32;

pub const XK_SPACE: Keysym = 0x0020;
pub const XK_0: Keysym = 0x0030;
pub const XK_1: Keysym = 0x0031;
pub const XK_2: Keysym = 0x0032;
pub const XK_3: Keysym = 0x0033;
pub const XK_4: Keysym = 0x0034;
pub const XK_5: Keysym = 0x0035;
pub const XK_6: Keysym = 0x0036;
pub const XK_7: Keysym = 0x0037;
pub const XK_8: Keysym = 0x0038;
pub const XK_9: Keysym = 0x0039;
pub const XK_B: Keysym = 0x0062;
pub const XK_D: Keysym = 0x0064;
pub const XK_E: Keysym = 0x0065;
pub const XK_F: Keysym = 0x0066;
pub const XK_H: Keysym = 0x0068;
pub const XK_I: Keysym = 0x0069;
pub const XK_J: Keysym = 0x006a;
pub const XK_K: Keysym = 0x006b;
pub const XK_L: Keysym = 0x006c;
pub const XK_O: Keysym = 0x006f;
pub const XK_P: Keysym = 0x0070;
pub const XK_Q: Keysym = 0x0071;
pub const XK_U: Keysym = 0x0075;
pub const XK_Y: Keysym = 0x0079;
pub const XK_Z: Keysym = 0x007a;
pub const XK_RETURN: Keysym = 0xff0d;
pub const XK_NUM_LOCK: Keysym = 0xff7f;
