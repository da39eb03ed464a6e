//! Guild-level permissions using bitflags.
//!
//! Permissions are organized into categories:
//! - Content (bits 0-7): Message, reaction and thread permissions
//! - Moderation (bits 10-13): Member management permissions
//! - Guild Management (bits 14-20): Administrative permissions
//! - Channel Visibility (bit 24)
//! - Administrator (bit 40): Sentinel that implies every other bit
//!
//! Bit positions are part of the stored format and must never be reused.

use bitflags::bitflags;

bitflags! {
    /// Guild permissions represented as a 64-bit bitfield.
    ///
    /// Stored as BIGINT in PostgreSQL for efficient database operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct GuildPermissions: u64 {
        // === Content (bits 0-7) ===
        /// Permission to send text messages in channels
        const SEND_MESSAGES        = 1 << 0;
        /// Permission to embed links in messages (auto-preview)
        const EMBED_LINKS          = 1 << 1;
        /// Permission to attach files to messages
        const ATTACH_FILES         = 1 << 2;
        /// Permission to use custom emoji
        const USE_EMOJI            = 1 << 3;
        /// Permission to add reactions to messages
        const ADD_REACTIONS        = 1 << 4;
        /// Permission to read messages sent before the member opened the channel
        const READ_MESSAGE_HISTORY = 1 << 5;
        /// Permission to mention @everyone and @here
        const MENTION_EVERYONE     = 1 << 6;
        /// Permission to start threads, forum posts and gallery posts
        const CREATE_THREADS       = 1 << 7;

        // === Moderation (bits 10-13) ===
        /// Permission to delete and pin messages from other members
        const MANAGE_MESSAGES      = 1 << 10;
        /// Permission to timeout members (temporary mute)
        const TIMEOUT_MEMBERS      = 1 << 11;
        /// Permission to kick members from the guild
        const KICK_MEMBERS         = 1 << 12;
        /// Permission to ban members from the guild
        const BAN_MEMBERS          = 1 << 13;

        // === Guild Management (bits 14-20) ===
        /// Permission to create, edit, and delete channels
        const MANAGE_CHANNELS      = 1 << 14;
        /// Permission to create, edit, and delete roles
        const MANAGE_ROLES         = 1 << 15;
        /// Permission to view the guild audit log
        const VIEW_AUDIT_LOG       = 1 << 16;
        /// Permission to modify guild settings
        const MANAGE_GUILD         = 1 << 17;
        /// Permission to archive, lock and delete threads started by others
        const MANAGE_THREADS       = 1 << 18;
        /// Permission to create and delete webhooks
        const MANAGE_WEBHOOKS      = 1 << 19;
        /// Permission to create invite links
        const CREATE_INVITE        = 1 << 20;

        // === Channel Visibility (bit 24) ===
        /// Permission to view a channel
        const VIEW_CHANNEL         = 1 << 24;

        // === Administrator (bit 40) ===
        /// Grants every permission, including ones denied by roles.
        const ADMINISTRATOR        = 1 << 40;
    }
}

impl GuildPermissions {
    // === Preset Combinations ===

    /// Every bit of the 64-bit space set.
    ///
    /// Returned for guild owners, instance admins and DM participants.
    pub const ALL_BITS: Self = Self::from_bits_retain(u64::MAX);

    /// Default permissions for the @everyone baseline of a new guild.
    pub const EVERYONE_DEFAULT: Self = Self::VIEW_CHANNEL
        .union(Self::SEND_MESSAGES)
        .union(Self::EMBED_LINKS)
        .union(Self::ATTACH_FILES)
        .union(Self::USE_EMOJI)
        .union(Self::ADD_REACTIONS)
        .union(Self::READ_MESSAGE_HISTORY)
        .union(Self::CREATE_THREADS)
        .union(Self::CREATE_INVITE);

    /// Default permissions for moderators.
    pub const MODERATOR_DEFAULT: Self = Self::EVERYONE_DEFAULT
        .union(Self::MANAGE_MESSAGES)
        .union(Self::MANAGE_THREADS)
        .union(Self::TIMEOUT_MEMBERS)
        .union(Self::KICK_MEMBERS)
        .union(Self::VIEW_AUDIT_LOG)
        .union(Self::MENTION_EVERYONE);

    // === Database Conversion ===

    /// Create permissions from a database BIGINT value.
    ///
    /// The i64 bit pattern is reinterpreted as u64. Unknown bits are kept so
    /// the all-bits sentinel survives a round trip.
    #[must_use]
    pub const fn from_db(value: i64) -> Self {
        Self::from_bits_retain(value as u64)
    }

    /// Convert permissions to a database BIGINT value.
    #[must_use]
    pub const fn to_db(self) -> i64 {
        self.bits() as i64
    }

    // === Permission Checking ===

    /// Check if this permission set includes the specified permission(s).
    ///
    /// A set holding `ADMINISTRATOR` includes everything.
    ///
    /// # Examples
    ///
    /// ```
    /// use parley_server::permissions::GuildPermissions;
    ///
    /// let perms = GuildPermissions::SEND_MESSAGES | GuildPermissions::ADD_REACTIONS;
    /// assert!(perms.has(GuildPermissions::SEND_MESSAGES));
    /// assert!(!perms.has(GuildPermissions::BAN_MEMBERS));
    ///
    /// let admin = GuildPermissions::ADMINISTRATOR;
    /// assert!(admin.has(GuildPermissions::BAN_MEMBERS));
    /// ```
    #[must_use]
    pub const fn has(self, permission: Self) -> bool {
        self.contains(Self::ADMINISTRATOR) || self.contains(permission)
    }

    /// Whether this set is the all-bits sentinel.
    #[must_use]
    pub const fn is_all_bits(self) -> bool {
        self.bits() == u64::MAX
    }
}

impl Default for GuildPermissions {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<i64> for GuildPermissions {
    fn from(value: i64) -> Self {
        Self::from_db(value)
    }
}

bitflags! {
    /// Account-level flags stored on the user row.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UserFlags: u64 {
        /// Instance administrator. Bypasses guild permissions everywhere.
        const ADMIN = 1 << 0;
        /// Automated account.
        const BOT   = 1 << 1;
    }
}

impl UserFlags {
    /// Create flags from a database BIGINT value, ignoring unknown bits.
    #[must_use]
    pub const fn from_db(value: i64) -> Self {
        Self::from_bits_truncate(value as u64)
    }

    /// Whether the account is an instance administrator.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        self.contains(Self::ADMIN)
    }
}
