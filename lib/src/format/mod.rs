pub mod mdl;
pub mod vmt;
pub mod vtf;
pub mod vtx;
pub mod vvd;

use std::fmt::{Debug, Display, Formatter, Write};

use binrw::binrw;

use crate::array_ref;

#[binrw]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct FourCC(pub [u8; 4]);

impl Display for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for c in self.0 {
            if c != 0 {
                f.write_char(c as char)?;
            }
        }
        Ok(())
    }
}

impl Debug for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_char('"')?;
        Display::fmt(self, f)?;
        f.write_char('"')?;
        Ok(())
    }
}

impl PartialEq<[u8; 4]> for FourCC {
    fn eq(&self, other: &[u8; 4]) -> bool { &self.0 == other }
}

/// Reads the leading four-character tag of a buffer, used to sniff which
/// format a file holds. Returns `None` for buffers too short to hold one.
pub fn peek_four_cc(data: &[u8]) -> Option<FourCC> {
    (data.len() >= 4).then(|| FourCC(*array_ref!(data, 0, 4)))
}
