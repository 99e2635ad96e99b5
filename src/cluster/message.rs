use std::fmt;

use bytes::Bytes;

/// Message tags. Each logical stream of the protocol has its own tag so a
/// receive for one mode never consumes traffic meant for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Broadcast = 1,
    Gather = 2,
    List = 3,
    Sort = 4,
    Aggregate = 5,
    TputPhase1 = 6,
    TputPhase2 = 7,
    TputPhase3 = 8,
    Progress = 9,
}

impl Tag {
    pub fn from_u8(raw: u8) -> Option<Tag> {
        match raw {
            1 => Some(Tag::Broadcast),
            2 => Some(Tag::Gather),
            3 => Some(Tag::List),
            4 => Some(Tag::Sort),
            5 => Some(Tag::Aggregate),
            6 => Some(Tag::TputPhase1),
            7 => Some(Tag::TputPhase2),
            8 => Some(Tag::TputPhase3),
            9 => Some(Tag::Progress),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Broadcast => "broadcast",
            Tag::Gather => "gather",
            Tag::List => "list",
            Tag::Sort => "sort",
            Tag::Aggregate => "aggregate",
            Tag::TputPhase1 => "tput-phase1",
            Tag::TputPhase2 => "tput-phase2",
            Tag::TputPhase3 => "tput-phase3",
            Tag::Progress => "progress",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub source: usize,
    pub tag: Tag,
    pub payload: Bytes,
}

impl Envelope {
    /// A zero-length payload ends a stream for its tag.
    pub fn is_terminator(&self) -> bool {
        self.payload.is_empty()
    }
}
