//! Routes ffmpeg's own log messages into `log`.
//!
//! The callback runs deep inside ffmpeg, so it only buffers the messages in a thread
//! local. The decoder drains the buffer after every call into ffmpeg and logs them with
//! the path of its video attached.

use std::{cell::RefCell, path::Path};

use ffmpeg_next::util::log as ffmpeglog;

struct Item {
    level: log::Level,
    target: String,
    body: String,
}

thread_local! {
    static LOGS: RefCell<Vec<Item>> = const { RefCell::new(Vec::new()) };
}

pub fn install() {
    ffmpeglog::set_level(ffmpeglog::Level::Warning);
    unsafe {
        ffmpeg_sys_next::av_log_set_callback(Some(ffmpeg_log_adaptor));
    }
}

pub fn drain(video: &Path) {
    LOGS.with_borrow_mut(|vec| {
        for item in vec.drain(..) {
            log::log!(
                target: &item.target,
                item.level,
                "{} ({})",
                item.body,
                video.display()
            );
        }
    })
}

extern "C" {
    fn vsnprintf(
        strbuf: *mut libc::c_char,
        size: libc::size_t,
        format: *const libc::c_char,
        va_list: *mut libc::c_void,
    ) -> libc::c_int;
}

unsafe extern "C" fn ffmpeg_log_adaptor(
    avcl: *mut libc::c_void,
    level: libc::c_int,
    fmt: *const libc::c_char,
    va_list: *mut ffmpeg_sys_next::__va_list_tag,
) {
    if level > ffmpeg_sys_next::av_log_get_level() {
        return;
    }

    const BUF_SIZE: usize = 2048;
    let mut buffer: Vec<u8> = vec![0; BUF_SIZE];
    let written = vsnprintf(
        buffer.as_mut_ptr() as *mut libc::c_char,
        BUF_SIZE,
        fmt,
        va_list as *mut libc::c_void,
    );
    let Ok(written) = usize::try_from(written) else {
        eprintln!("failed to format a log message from ffmpeg");
        return;
    };
    // vsnprintf reports the untruncated length and always leaves room for the null
    buffer.truncate(written.min(BUF_SIZE - 1));

    let body = String::from_utf8_lossy(&buffer).trim_end().to_string();
    if body.is_empty() {
        return;
    }

    let target = format!("ffmpeg::{}", class_name(avcl));
    let level = match ffmpeglog::Level::try_from(level) {
        Ok(ffmpeglog::Level::Error | ffmpeglog::Level::Fatal | ffmpeglog::Level::Panic) => {
            log::Level::Error
        }
        Ok(ffmpeglog::Level::Warning) => log::Level::Warn,
        Ok(ffmpeglog::Level::Info) | Err(_) => log::Level::Info,
        Ok(_) => log::Level::Debug,
    };

    LOGS.with_borrow_mut(|vec| {
        vec.push(Item {
            level,
            target,
            body,
        })
    });
}

unsafe fn class_name(avcl: *mut libc::c_void) -> String {
    if avcl.is_null() {
        return "NULL_avcl".into();
    }

    let avc = *(avcl as *const *const ffmpeg_sys_next::AVClass);
    if avc.is_null() {
        return "NULL_avc".into();
    }

    match (*avc).item_name {
        Some(fun) => {
            let item = std::ffi::CStr::from_ptr(fun(avcl)).to_string_lossy();
            if item == "NULL" {
                std::ffi::CStr::from_ptr((*avc).class_name)
                    .to_string_lossy()
                    .into_owned()
            } else {
                item.into_owned()
            }
        }
        None => "NULL_item".into(),
    }
}
