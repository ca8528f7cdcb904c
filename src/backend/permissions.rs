use derive_more::{BitAnd, BitAndAssign, BitOr, BitOrAssign, From, Into, Not};

/// POSIX permission bits: nine rwx bits plus setuid, setgid and sticky.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    BitOr,
    BitOrAssign,
    BitAnd,
    BitAndAssign,
    Not,
    From,
    Into,
)]
pub struct Permissions(u32);

impl Permissions {
    pub const NONE: Self = Self(0);

    pub const USER_READ: Self = Self(0o400);
    pub const USER_WRITE: Self = Self(0o200);
    pub const USER_EXEC: Self = Self(0o100);
    pub const GROUP_READ: Self = Self(0o040);
    pub const GROUP_WRITE: Self = Self(0o020);
    pub const GROUP_EXEC: Self = Self(0o010);
    pub const OTHER_READ: Self = Self(0o004);
    pub const OTHER_WRITE: Self = Self(0o002);
    pub const OTHER_EXEC: Self = Self(0o001);
    pub const SET_UID: Self = Self(0o4000);
    pub const SET_GID: Self = Self(0o2000);
    pub const STICKY: Self = Self(0o1000);

    pub const ALL: Self = Self(0o7777);

    /// Masks a raw `st_mode` down to the permission bits.
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & 0o7777)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Renders the bits the way `ls -l` does, without the type column.
    pub fn to_symbolic(self) -> String {
        let triple = |read: Self, write: Self, exec: Self, special: Self, special_char: char| {
            let mut out = String::with_capacity(3);
            out.push(if self.contains(read) { 'r' } else { '-' });
            out.push(if self.contains(write) { 'w' } else { '-' });
            out.push(match (self.contains(exec), self.contains(special)) {
                (true, true) => special_char,
                (false, true) => special_char.to_ascii_uppercase(),
                (true, false) => 'x',
                (false, false) => '-',
            });
            out
        };

        [
            triple(Self::USER_READ, Self::USER_WRITE, Self::USER_EXEC, Self::SET_UID, 's'),
            triple(Self::GROUP_READ, Self::GROUP_WRITE, Self::GROUP_EXEC, Self::SET_GID, 's'),
            triple(Self::OTHER_READ, Self::OTHER_WRITE, Self::OTHER_EXEC, Self::STICKY, 't'),
        ]
        .concat()
    }
}
