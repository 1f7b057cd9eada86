use crate::A2lError;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// load an a2l file as text. The encoding is detected from the content (UTF-32, UTF-16, UTF-8 or latin-1)
pub(crate) fn load(path: &Path) -> Result<String, A2lError> {
    let filedata = load_bytes(path)?;
    let text = decode_raw_bytes(&filedata);

    // the tokenizer would also strip a BOM, but the check for empty files should not see it
    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// load the raw content of a file, e.g. a binary memory image
pub(crate) fn load_bytes(path: &Path) -> Result<Vec<u8>, A2lError> {
    let mut file = File::open(path).map_err(|ioerror| A2lError::FileOpenError {
        filename: path.to_path_buf(),
        ioerror,
    })?;

    let filesize = file
        .metadata()
        .map_err(|ioerror| A2lError::FileReadError {
            filename: path.to_path_buf(),
            ioerror,
        })?
        .len();
    let mut buffer = Vec::with_capacity(usize::try_from(filesize).unwrap_or(0));
    file.read_to_end(&mut buffer)
        .map_err(|ioerror| A2lError::FileReadError {
            filename: path.to_path_buf(),
            ioerror,
        })?;

    Ok(buffer)
}

fn decode_raw_bytes(filedata: &[u8]) -> String {
    // An a2l file starts with either a BOM or a basic ASCII character. With UTF-16 or UTF-32 the
    // first character therefore contains nul bytes, which is used to detect the encoding.
    if let Some(text) = decode_utf32(filedata) {
        return text;
    }
    if let Some(text) = decode_utf16(filedata) {
        return text;
    }
    if let Ok(text) = std::str::from_utf8(filedata) {
        return text.to_string();
    }

    // ISO8859-1 always succeeds: every byte is a valid latin-1 character
    filedata.iter().map(|ch| char::from(*ch)).collect()
}

// big endian: 00 00 FE FF (BOM) or 00 00 00 xx; little endian: FF FE 00 00 (BOM) or xx 00 00 00
fn decode_utf32(filedata: &[u8]) -> Option<String> {
    if filedata.len() % 4 != 0 || filedata.len() < 4 {
        return None;
    }
    let conversion: fn([u8; 4]) -> u32 =
        if filedata[0] == 0 && filedata[1] == 0 && filedata[3] != 0 {
            u32::from_be_bytes
        } else if filedata[0] != 0 && filedata[2] == 0 && filedata[3] == 0 {
            u32::from_le_bytes
        } else {
            return None;
        };

    filedata
        .chunks_exact(4)
        .map(|chunk| char::from_u32(conversion([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect()
}

// big endian: FE FF (BOM) or 00 xx; little endian: FF FE (BOM) or xx 00
fn decode_utf16(filedata: &[u8]) -> Option<String> {
    if filedata.len() % 2 != 0 || filedata.len() < 2 {
        return None;
    }
    let conversion: fn([u8; 2]) -> u16 = if (filedata[0] == 0 && filedata[1] != 0)
        || (filedata[0] == 0xfe && filedata[1] == 0xff)
    {
        u16::from_be_bytes
    } else if (filedata[0] != 0 && filedata[1] == 0)
        || (filedata[0] == 0xff && filedata[1] == 0xfe)
    {
        u16::from_le_bytes
    } else {
        return None;
    };

    let units: Vec<u16> = filedata
        .chunks_exact(2)
        .map(|chunk| conversion([chunk[0], chunk[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/*************************************************************************************************/
