/// Declares a group of flags. Creates `<Name>Cli`, to be flattened into a clap parser,
/// and `<Name>Args`, the plain value the library code takes. `<Name>Args` has a
/// `Default` equal to the flag defaults, a getter per field and a `with_<field>` builder
/// method, which is what tests and other non-CLI callers use.
#[macro_export]
macro_rules! args {
    ($(#$argsmeta:tt)* $name:ident {
        $($fhelp:literal $fname:ident: $ftype:ty = $fdefault:expr;)*
        $($mname:ident: $mtype:ty;)*
    }) => {
        $crate::bin_common::args::args_helper::paste! {
            #[derive(clap::Args, Debug)]
            pub struct [<$name Cli>] {
                $(
                    #[arg(long, default_value_t = ($fdefault), help = $fhelp)]
                    $fname: $ftype,
                )*

                $(
                    #[command(flatten)]
                    $mname: [<$mtype Cli>],
                )*
            }

            $(#$argsmeta)*
            pub struct [<$name Args>] {
                $(
                    $fname: $ftype,
                )*

                $(
                    $mname: [<$mtype Args>],
                )*
            }

            impl std::default::Default for [<$name Args>] {
                fn default() -> Self {
                    Self {
                        $(
                            $fname: $fdefault,
                        )*

                        $(
                            $mname: [<$mtype Args>]::default(),
                        )*
                    }
                }
            }

            impl [<$name Args>] {
                $(
                    pub fn [<with_ $fname>](mut self, $fname: $ftype) -> Self {
                        self.$fname = $fname;
                        self
                    }

                    pub fn $fname(&self) -> $ftype {
                        self.$fname.clone()
                    }
                )*

                $(
                    pub fn [<with_ $mname>](mut self, $mname: [<$mtype Args>]) -> Self {
                        self.$mname = $mname;
                        self
                    }

                    pub fn $mname(&self) -> &[<$mtype Args>] {
                        &self.$mname
                    }
                )*
            }

            impl [<$name Cli>] {
                pub fn to_args(&self) -> [<$name Args>] {
                    [<$name Args>] {
                        $(
                            $fname: self.$fname.clone(),
                        )*

                        $(
                            $mname: self.$mname.to_args(),
                        )*
                    }
                }
            }
        }
    };
}

pub use args;
pub use paste::paste;
