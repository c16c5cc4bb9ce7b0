//! Header attributes consumed by the boot ROM.
//!
//! The ROM reads these `id=value` pairs out of the signed header to find the
//! SCRTU and DDR firmware that follow it. Offsets are relative to the start
//! of the final image, so they can only be computed once the size of the
//! signed header is known.

use std::fmt;

/// SPI configuration word (passed through from `--attr_spi`).
pub const ATTR_SPI: u32 = 0x8000_0001;
/// Offset of the SCRTU firmware inside the signed image.
pub const ATTR_SCRTU_OFFSET: u32 = 0x8000_0002;
/// Offset of the DDR firmware inside the signed image.
pub const ATTR_DDR_OFFSET: u32 = 0x8000_0003;
/// Size of the whole signed image.
pub const ATTR_TOTAL_SIZE: u32 = 0x8000_0004;
/// BL33 load address on SPI boot.
pub const ATTR_SPI_BL33_ADDR: u32 = 0x8000_0005;
/// BL33 size on SPI boot.
pub const ATTR_SPI_BL33_SIZE: u32 = 0x8000_0006;

/// One `-attribute <id>=<value>` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub id: u32,
    pub value: String,
}

impl Attribute {
    pub fn new(id: u32, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}={}", self.id, self.value)
    }
}

/// Hex attributes given on the command line, forwarded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrParams {
    pub spi: Option<String>,
    pub spi_bl33_addr: Option<String>,
    pub spi_bl33_size: Option<String>,
}

/// Sizes of the pieces making up the signed image.
///
/// `None` means the piece was not supplied; it then occupies no space and
/// gets no offset attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadLayout {
    pub header_size: u64,
    pub scrtu_size: Option<u64>,
    pub ddr_size: Option<u64>,
}

impl PayloadLayout {
    /// SCRTU firmware starts right after the signed header.
    pub fn scrtu_offset(&self) -> u64 {
        self.header_size
    }

    pub fn ddr_offset(&self) -> u64 {
        self.scrtu_offset() + self.scrtu_size.unwrap_or(0)
    }

    pub fn total_size(&self) -> u64 {
        self.ddr_offset() + self.ddr_size.unwrap_or(0)
    }
}

/// Build the attribute list for the final signing pass.
///
/// Order matches the `signtool` command line: SPI, BL33 address, BL33 size,
/// SCRTU offset, DDR offset, total size. The total size is always present.
pub fn compute_attributes(params: &AttrParams, layout: &PayloadLayout) -> Vec<Attribute> {
    let mut attrs = Vec::with_capacity(6);

    let passthrough = [
        (ATTR_SPI, &params.spi),
        (ATTR_SPI_BL33_ADDR, &params.spi_bl33_addr),
        (ATTR_SPI_BL33_SIZE, &params.spi_bl33_size),
    ];
    for (id, value) in passthrough {
        if let Some(v) = value {
            attrs.push(Attribute::new(id, v.as_str()));
        }
    }

    if layout.scrtu_size.is_some() {
        attrs.push(Attribute::new(
            ATTR_SCRTU_OFFSET,
            layout.scrtu_offset().to_string(),
        ));
    }
    if layout.ddr_size.is_some() {
        attrs.push(Attribute::new(
            ATTR_DDR_OFFSET,
            layout.ddr_offset().to_string(),
        ));
    }
    attrs.push(Attribute::new(
        ATTR_TOTAL_SIZE,
        layout.total_size().to_string(),
    ));

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_display() {
        let a = Attribute::new(ATTR_SPI, "0x12341234");
        assert_eq!(a.to_string(), "0x80000001=0x12341234");
        assert_eq!(Attribute::new(ATTR_TOTAL_SIZE, "7").to_string(), "0x80000004=7");
    }

    #[test]
    fn offsets_follow_header() {
        let layout = PayloadLayout {
            header_size: 0x400,
            scrtu_size: Some(0x1000),
            ddr_size: Some(0x2345),
        };
        assert_eq!(layout.scrtu_offset(), 0x400);
        assert_eq!(layout.ddr_offset(), 0x1400);
        assert_eq!(layout.total_size(), 0x3745);

        let attrs = compute_attributes(&AttrParams::default(), &layout);
        assert_eq!(
            attrs,
            vec![
                Attribute::new(ATTR_SCRTU_OFFSET, "1024"),
                Attribute::new(ATTR_DDR_OFFSET, "5120"),
                Attribute::new(ATTR_TOTAL_SIZE, "14149"),
            ]
        );
    }

    #[test]
    fn header_only_yields_total_size() {
        let layout = PayloadLayout {
            header_size: 1312,
            ..Default::default()
        };
        let attrs = compute_attributes(&AttrParams::default(), &layout);
        assert_eq!(attrs, vec![Attribute::new(ATTR_TOTAL_SIZE, "1312")]);
    }

    #[test]
    fn missing_scrtu_takes_no_space() {
        let layout = PayloadLayout {
            header_size: 100,
            scrtu_size: None,
            ddr_size: Some(50),
        };
        let attrs = compute_attributes(&AttrParams::default(), &layout);
        assert_eq!(
            attrs,
            vec![
                Attribute::new(ATTR_DDR_OFFSET, "100"),
                Attribute::new(ATTR_TOTAL_SIZE, "150"),
            ]
        );
    }

    #[test]
    fn empty_scrtu_still_gets_offset() {
        let layout = PayloadLayout {
            header_size: 64,
            scrtu_size: Some(0),
            ddr_size: None,
        };
        let attrs = compute_attributes(&AttrParams::default(), &layout);
        assert_eq!(
            attrs,
            vec![
                Attribute::new(ATTR_SCRTU_OFFSET, "64"),
                Attribute::new(ATTR_TOTAL_SIZE, "64"),
            ]
        );
    }

    #[test]
    fn spi_attributes_come_first() {
        let params = AttrParams {
            spi: Some("0x00000003".into()),
            spi_bl33_addr: Some("0x20000".into()),
            spi_bl33_size: Some("0x80000".into()),
        };
        let layout = PayloadLayout {
            header_size: 10,
            scrtu_size: Some(20),
            ddr_size: Some(30),
        };
        let args: Vec<String> = compute_attributes(&params, &layout)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            args,
            [
                "0x80000001=0x00000003",
                "0x80000005=0x20000",
                "0x80000006=0x80000",
                "0x80000002=10",
                "0x80000003=30",
                "0x80000004=60",
            ]
        );
    }
}
